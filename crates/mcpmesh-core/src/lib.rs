//! Core data model, configuration, and error types shared across the
//! mcpmesh workspace: the Route/HandlerRef/SchemaBundle graph that
//! `mcpmesh-discovery` populates and `mcpmesh-schema`/`mcpmesh-mcp`
//! project, plus the process-wide `Config`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod route;
pub mod schema;
pub mod spec;

pub use config::Config;
pub use error::{MeshError, Result};
pub use route::{Handler, HandlerCapabilities, HandlerRef, HttpMethod, Route};
pub use schema::SchemaBundle;

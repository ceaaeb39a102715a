//! OpenAPI document synthesis (C5) and MCP tool synthesis (C6) from a
//! route registry snapshot.

pub mod error;
pub mod openapi;
pub mod route_mapping;
pub mod tool;

pub use error::{Result, SchemaError};
pub use openapi::{synthesize as synthesize_openapi, ApiInfo};
pub use route_mapping::{McpKind, RouteMapping};
pub use tool::{synthesize_tools, synthesize_tools_indexed, tool_name};

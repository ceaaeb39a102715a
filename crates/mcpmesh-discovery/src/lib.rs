//! Handler discovery, annotation extraction, route registry, and
//! hot-reload watching.

pub mod annotation;
pub mod discover;
pub mod error;
pub mod loader;
pub mod matcher;
pub mod registry;
pub mod watcher;

pub use discover::DiscoveryEngine;
pub use error::{DiscoveryError, LoadError, LoaderErrorEntry, Result};
pub use loader::{DylibHandlerLoader, HandlerLoader, LoadedModule, MockHandlerLoader};
pub use matcher::match_route;
pub use registry::{RouteEntry, RouteKey, RouteRegistry, RouteTable, RouteTableBuilder};
pub use watcher::{HotReloadWatcher, DEFAULT_DEBOUNCE};

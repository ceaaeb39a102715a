//! MCP request multiplexer (C10) and prompts/resources cache manager
//! (C11).

pub mod cache;
pub mod cache_watcher;
pub mod error;
pub mod multiplexer;

pub use cache::{CacheEntry, CacheKind, CacheManager, CacheStatsSnapshot, ContentFormat};
pub use cache_watcher::CacheWatcher;
pub use error::{McpError, Result};
pub use multiplexer::{Multiplexer, ToolListResult, MCP_PROTOCOL_VERSION};

//! Shared application state wired together in `main` and handed to every
//! axum handler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use mcpmesh_bridge::BridgeSupervisor;
use mcpmesh_core::config::Config;
use mcpmesh_core::middleware::MiddlewareStack;
use mcpmesh_discovery::RouteRegistry;
use mcpmesh_mcp::Multiplexer;

/// Re-run discovery for exactly the given files and republish the
/// registry; built in `main` over the concrete `DiscoveryEngine<L>` so
/// `AppState` doesn't need to be generic over the loader type.
pub type ReloadFn = dyn Fn(Vec<PathBuf>) + Send + Sync;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RouteRegistry>,
    pub middleware: Arc<MiddlewareStack>,
    pub bridges: Arc<BridgeSupervisor>,
    pub mux: Arc<Multiplexer>,
    pub reload: Arc<ReloadFn>,
    pub started_at: Instant,
    pub discovery_root: PathBuf,
}

//! Middleware layer tracking (§3 `Middleware layer`, §4.4 containment).

use std::path::PathBuf;
use std::sync::Arc;

use crate::route::Handler;

/// One middleware stack entry, installed by a `middleware.*` file under
/// some directory. Tracked per source file so a file change can remove
/// exactly the layers it installed, by identity.
#[derive(Clone)]
pub struct MiddlewareLayer {
    pub source_file: PathBuf,
    pub url_prefix: String,
    pub handlers: Vec<Arc<dyn Handler>>,
}

impl MiddlewareLayer {
    /// Identity match: two layers are the "same" installation if they
    /// came from the same source file, regardless of content — used by
    /// the hot-reload watcher to evict exactly what a changed file added.
    pub fn installed_by(&self, file: &std::path::Path) -> bool {
        self.source_file == file
    }
}

impl std::fmt::Debug for MiddlewareLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareLayer")
            .field("source_file", &self.source_file)
            .field("url_prefix", &self.url_prefix)
            .field("handler_count", &self.handlers.len())
            .finish()
    }
}

/// Names of the always-on middleware the server installs itself
/// (logging, CORS, body parsing, static serving) — pinned so the
/// hot-reload watcher never evicts them by accident (§4.4: "identified
/// by a pinned allow-list, not by index position").
pub const CORE_MIDDLEWARE_NAMES: &[&str] = &["logging", "cors", "body-parser", "static"];

/// Sink that middleware installs into and the hot-reload watcher removes
/// from. A single owner (the HTTP surface) holds the live stack; this
/// trait is the narrow interface discovery/reload code needs against it.
pub trait MiddlewareSink: Send + Sync {
    /// Install a layer, returning nothing — failures are not expected
    /// here since no I/O happens at install time.
    fn install(&self, layer: MiddlewareLayer);

    /// Remove every non-core layer installed by `file`.
    fn evict(&self, file: &std::path::Path);

    /// Current layer count, for observability / tests.
    fn layer_count(&self) -> usize;
}

/// In-memory [`MiddlewareSink`] used by the HTTP surface and by tests.
#[derive(Default)]
pub struct MiddlewareStack {
    layers: parking_lot_like::Mutex<Vec<MiddlewareLayer>>,
}

// A tiny re-implementation-free alias module: mcpmesh-core intentionally
// stays dependency-light, so the stack uses std's Mutex rather than
// pulling in parking_lot just for this one type. Discovery/bridge/mcp
// crates that need lock-free reads use arc-swap/dashmap directly.
mod parking_lot_like {
    pub use std::sync::Mutex;
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MiddlewareSink for MiddlewareStack {
    fn install(&self, layer: MiddlewareLayer) {
        self.layers.lock().unwrap().push(layer);
    }

    fn evict(&self, file: &std::path::Path) {
        self.layers.lock().unwrap().retain(|l| !l.installed_by(file));
    }

    fn layer_count(&self) -> usize {
        self.layers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(file: &str, prefix: &str) -> MiddlewareLayer {
        MiddlewareLayer {
            source_file: PathBuf::from(file),
            url_prefix: prefix.to_string(),
            handlers: Vec::new(),
        }
    }

    #[test]
    fn evict_removes_only_owning_file_layers() {
        let stack = MiddlewareStack::new();
        stack.install(layer("a/middleware.rs", "/a"));
        stack.install(layer("b/middleware.rs", "/b"));
        assert_eq!(stack.layer_count(), 2);

        stack.evict(std::path::Path::new("a/middleware.rs"));
        assert_eq!(stack.layer_count(), 1);
    }
}

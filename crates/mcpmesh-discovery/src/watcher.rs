//! Hot-reload watcher (C4, §4.4): debounces filesystem events, re-runs
//! discovery for the changed subset, and atomically republishes the
//! route registry.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use mcpmesh_core::middleware::MiddlewareSink;

use crate::discover::DiscoveryEngine;
use crate::loader::HandlerLoader;
use crate::registry::RouteRegistry;

/// Default coalescing window: distinct events for the same save (write,
/// then rename-on-some-editors) collapse into one reload pass.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Owns the live `notify` watcher; dropping this stops watching.
pub struct HotReloadWatcher {
    _inner: RecommendedWatcher,
}

impl HotReloadWatcher {
    /// Start watching `root` recursively, spawning a background task that
    /// debounces events and republishes `registry` on every settled batch.
    pub fn spawn<L>(
        root: PathBuf,
        engine: Arc<DiscoveryEngine<L>>,
        registry: Arc<RouteRegistry>,
        middleware_sink: Arc<dyn MiddlewareSink>,
        debounce: Duration,
    ) -> notify::Result<Self>
    where
        L: HandlerLoader + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event.kind) => {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "filesystem watch error"),
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        tokio::spawn(async move {
            let mut pending: HashSet<PathBuf> = HashSet::new();
            loop {
                tokio::select! {
                    received = rx.recv() => {
                        match received {
                            Some(path) => { pending.insert(path); }
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(debounce), if !pending.is_empty() => {
                        let changed: Vec<PathBuf> = pending.drain().collect();
                        let previous = registry.snapshot();
                        let builder = engine.rescan_files(&previous, &changed, middleware_sink.as_ref());
                        let table = builder.build();
                        tracing::info!(
                            changed = changed.len(),
                            routes = table.len(),
                            errors = table.errors().len(),
                            "reloaded route registry"
                        );
                        registry.publish(table);
                    }
                }
            }
        });

        Ok(Self { _inner: watcher })
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{LoadedModule, MockHandlerLoader};
    use mcpmesh_core::middleware::MiddlewareStack;
    use mcpmesh_core::route::{FnHandler, HandlerRef, HttpMethod, ResponseCtx};

    #[tokio::test]
    async fn reload_picks_up_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Arc::new(MockHandlerLoader::new());
        let engine = Arc::new(DiscoveryEngine::new(dir.path(), loader.clone()));
        let registry = Arc::new(RouteRegistry::new());
        let sink: Arc<dyn MiddlewareSink> = Arc::new(MiddlewareStack::new());

        let _watcher = HotReloadWatcher::spawn(
            dir.path().to_path_buf(),
            engine,
            registry.clone(),
            sink,
            Duration::from_millis(50),
        )
        .unwrap();

        let file = dir.path().join("get.so");
        loader.register(
            file.clone(),
            LoadedModule {
                handler: HandlerRef::FuncHandler(Arc::new(FnHandler(|_| async move {
                    ResponseCtx::ok(serde_json::Value::Null)
                }))),
                explicit_schema: None,
                typed_request_schema: None,
                typed_response_schema: None,
                annotations: None,
            },
        );
        std::fs::write(&file, b"").unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;

        let snap = registry.snapshot();
        assert!(snap
            .get(&(HttpMethod::Get, "/".to_string()))
            .is_some());
    }
}

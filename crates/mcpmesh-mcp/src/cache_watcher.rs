//! Filesystem watcher that evicts [`CacheManager`] entries on
//! `add|change|unlink` (§4.11). Unlike the route discovery watcher, no
//! debounce is applied — eviction is cheap and idempotent, so each event
//! is handled as it arrives.

use std::path::Path;
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::cache::{CacheKind, CacheManager};

pub struct CacheWatcher {
    _prompts: RecommendedWatcher,
    _resources: RecommendedWatcher,
}

impl CacheWatcher {
    pub fn spawn(manager: Arc<CacheManager>) -> notify::Result<Self> {
        let prompts_manager = manager.clone();
        let prompts_root = manager.prompts_root().to_path_buf();
        let mut prompts_watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if is_relevant(&event.kind) {
                    for path in &event.paths {
                        evict_relative(&prompts_manager, CacheKind::Prompt, &prompts_root, path);
                    }
                }
            }
        })?;
        if prompts_root.exists() {
            prompts_watcher.watch(&prompts_root, RecursiveMode::Recursive)?;
        }

        let resources_manager = manager.clone();
        let resources_root = manager.resources_root().to_path_buf();
        let mut resources_watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if is_relevant(&event.kind) {
                    for path in &event.paths {
                        evict_relative(&resources_manager, CacheKind::Resource, &resources_root, path);
                    }
                }
            }
        })?;
        if resources_root.exists() {
            resources_watcher.watch(&resources_root, RecursiveMode::Recursive)?;
        }

        Ok(Self {
            _prompts: prompts_watcher,
            _resources: resources_watcher,
        })
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn evict_relative(manager: &CacheManager, kind: CacheKind, root: &Path, path: &Path) {
    if let Ok(relative) = path.strip_prefix(root) {
        tracing::debug!(?kind, path = %relative.display(), "evicting cache entry");
        manager.evict(kind, relative);
    }
}

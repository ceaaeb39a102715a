//! Route registry (C3, §4.3): authoritative in-memory route table with
//! single-writer/multi-reader snapshots.

use arc_swap::ArcSwap;
use mcpmesh_core::route::{HttpMethod, Route};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::LoaderErrorEntry;

/// Key a route is stored/looked-up under. `(method, urlTemplate)` is
/// unique across the table (§3 invariant).
pub type RouteKey = (HttpMethod, String);

/// One entry in the table: the route plus a validation flag so that
/// entries whose handler lacks a callable contract remain visible to
/// observability endpoints while being excluded from MCP tool synthesis
/// (§4.3).
#[derive(Clone)]
pub struct RouteEntry {
    pub route: Route,
    pub valid: bool,
}

/// An immutable view of the whole registry, safe for concurrent readers
/// (§3 `Snapshot`).
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<RouteKey, RouteEntry>,
    errors: Vec<LoaderErrorEntry>,
}

impl RouteTable {
    pub fn get(&self, key: &RouteKey) -> Option<&RouteEntry> {
        self.routes.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    /// Only entries whose handler has a validated callable contract —
    /// the set C5/C6 project into derived artifacts.
    pub fn valid_routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values().filter(|e| e.valid).map(|e| &e.route)
    }

    pub fn errors(&self) -> &[LoaderErrorEntry] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder used by the discovery engine (C2) to construct the next
/// snapshot before publishing it atomically.
#[derive(Default)]
pub struct RouteTableBuilder {
    routes: HashMap<RouteKey, RouteEntry>,
    errors: Vec<LoaderErrorEntry>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder from a prior table, e.g. when rebuilding only
    /// the changed subset during a reload (§4.4 step 3).
    pub fn from_table(table: &RouteTable) -> Self {
        Self {
            routes: table.routes.clone(),
            errors: Vec::new(),
        }
    }

    /// Upsert a route. Atomic with respect to other files: a failing
    /// load of one file never corrupts entries already in the builder
    /// (§4.2 step 5).
    ///
    /// Returns `false` (and records a loader error) if `(method,
    /// url_template)` is already taken by a *different* file — "keep the
    /// first, record a loader error for the second" (§4.2 tie-break).
    pub fn upsert(&mut self, route: Route) -> bool {
        let key = route.key();
        if let Some(existing) = self.routes.get(&key) {
            if existing.route.file_path != route.file_path {
                self.errors.push(LoaderErrorEntry {
                    file: route.file_path,
                    category: "duplicate_route".to_string(),
                    message: format!(
                        "duplicate route {} {} also defined in {:?}",
                        key.0, key.1, existing.route.file_path
                    ),
                });
                return false;
            }
        }
        let valid = route.handler.capabilities().has_process;
        self.routes.insert(key, RouteEntry { route, valid });
        true
    }

    pub fn remove_file(&mut self, file: &std::path::Path) {
        self.routes.retain(|_, entry| entry.route.file_path != file);
    }

    pub fn push_error(&mut self, error: LoaderErrorEntry) {
        self.errors.push(error);
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: self.routes,
            errors: self.errors,
        }
    }
}

/// Single-writer, multi-reader registry. Readers call [`snapshot`] and
/// get a consistent view for the duration of their request; the writer
/// swaps in a new [`RouteTable`] atomically on each successful reload.
pub struct RouteRegistry {
    current: ArcSwap<RouteTable>,
    changes: tokio::sync::broadcast::Sender<()>,
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteRegistry {
    pub fn new() -> Self {
        let (changes, _) = tokio::sync::broadcast::channel(16);
        Self {
            current: ArcSwap::from_pointee(RouteTable::default()),
            changes,
        }
    }

    /// Take a consistent snapshot for a reader.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Publish a newly-built table, replacing whatever is current, and
    /// wake any subscriber waiting to emit `tools/list_changed` (§4.4
    /// step 4, open-question resolution 1: emit after every publish).
    pub fn publish(&self, table: RouteTable) {
        self.current.store(Arc::new(table));
        let _ = self.changes.send(());
    }

    /// Subscribe to publish events. Lagging subscribers simply miss
    /// coalesced notifications; the next snapshot read is still current.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_core::route::{FnHandler, HandlerRef, ResponseCtx};
    use mcpmesh_core::schema::SchemaBundle;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Arc as StdArc;

    fn dummy_route(method: HttpMethod, template: &str, file: &str) -> Route {
        Route {
            method,
            url_template: template.to_string(),
            handler: HandlerRef::FuncHandler(StdArc::new(FnHandler(|_| async move {
                ResponseCtx::ok(serde_json::Value::Null)
            }))),
            file_path: PathBuf::from(file),
            schema: SchemaBundle::default(),
        }
    }

    #[test]
    fn upsert_then_snapshot_is_consistent() {
        let registry = RouteRegistry::new();
        let mut builder = RouteTableBuilder::new();
        builder.upsert(dummy_route(HttpMethod::Get, "/users", "api/users/get.so"));
        registry.publish(builder.build());

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap
            .get(&(HttpMethod::Get, "/users".to_string()))
            .is_some());
    }

    #[test]
    fn duplicate_route_from_different_file_keeps_first() {
        let mut builder = RouteTableBuilder::new();
        assert!(builder.upsert(dummy_route(HttpMethod::Get, "/users", "a/get.so")));
        assert!(!builder.upsert(dummy_route(HttpMethod::Get, "/users", "b/get.so")));
        let table = builder.build();
        assert_eq!(table.len(), 1);
        assert_eq!(table.errors().len(), 1);
        assert_eq!(
            table
                .get(&(HttpMethod::Get, "/users".to_string()))
                .unwrap()
                .route
                .file_path,
            PathBuf::from("a/get.so")
        );
    }

    #[test]
    fn same_file_reupsert_replaces_in_place() {
        let mut builder = RouteTableBuilder::new();
        assert!(builder.upsert(dummy_route(HttpMethod::Get, "/users", "a/get.so")));
        assert!(builder.upsert(dummy_route(HttpMethod::Get, "/users", "a/get.so")));
        let table = builder.build();
        assert_eq!(table.len(), 1);
        assert!(table.errors().is_empty());
    }

    #[test]
    fn remove_file_drops_only_its_routes() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(dummy_route(HttpMethod::Get, "/a", "a/get.so"));
        builder.upsert(dummy_route(HttpMethod::Get, "/b", "b/get.so"));
        builder.remove_file(std::path::Path::new("a/get.so"));
        let table = builder.build();
        assert_eq!(table.len(), 1);
        assert!(table.get(&(HttpMethod::Get, "/b".to_string())).is_some());
    }

    #[test]
    fn reader_snapshot_unaffected_by_later_publish() {
        let registry = RouteRegistry::new();
        let mut builder = RouteTableBuilder::new();
        builder.upsert(dummy_route(HttpMethod::Get, "/a", "a/get.so"));
        registry.publish(builder.build());

        let snap = registry.snapshot();

        let mut builder2 = RouteTableBuilder::new();
        builder2.upsert(dummy_route(HttpMethod::Get, "/b", "b/get.so"));
        registry.publish(builder2.build());

        assert_eq!(snap.len(), 1, "old snapshot must not observe the new publish");
        assert_eq!(registry.snapshot().len(), 1);
    }

    use proptest::prelude::*;

    fn arb_method() -> impl Strategy<Value = HttpMethod> {
        prop_oneof![
            Just(HttpMethod::Get),
            Just(HttpMethod::Post),
            Just(HttpMethod::Put),
            Just(HttpMethod::Patch),
            Just(HttpMethod::Delete),
        ]
    }

    proptest! {
        /// §3 invariant: `(method, urlTemplate)` is unique across the table
        /// regardless of the order upserts arrive in, even when the input
        /// stream contains outright key collisions.
        #[test]
        fn upsert_uniqueness_is_order_independent(
            methods in proptest::collection::vec(arb_method(), 2..12),
            rotate_by in 0usize..12,
        ) {
            // Fold the template space down so collisions are likely: every
            // third index reuses the same template as index 0 of its group.
            let keyed: Vec<(HttpMethod, String)> = methods
                .iter()
                .enumerate()
                .map(|(i, method)| (*method, format!("/thing{}", i % 3)))
                .collect();
            let distinct_keys: HashSet<(HttpMethod, String)> = keyed.iter().cloned().collect();

            let mut forward = RouteTableBuilder::new();
            for (i, (method, template)) in keyed.iter().enumerate() {
                forward.upsert(dummy_route(*method, template, &format!("f{i}/get.so")));
            }
            let forward_table = forward.build();

            let mut shuffled = keyed.clone();
            let n = shuffled.len();
            shuffled.rotate_left(rotate_by % n);
            let mut reordered = RouteTableBuilder::new();
            for (i, (method, template)) in shuffled.iter().enumerate() {
                reordered.upsert(dummy_route(*method, template, &format!("r{i}/get.so")));
            }
            let reordered_table = reordered.build();

            prop_assert_eq!(forward_table.len(), distinct_keys.len());
            prop_assert_eq!(reordered_table.len(), distinct_keys.len());
            for (method, template) in &distinct_keys {
                prop_assert!(forward_table.get(&(*method, template.clone())).is_some());
                prop_assert!(reordered_table.get(&(*method, template.clone())).is_some());
            }
        }
    }
}

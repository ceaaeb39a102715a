//! Discovery engine (C2, §4.2): walks a handler root and produces a
//! route table plus a middleware install list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mcpmesh_core::middleware::{MiddlewareLayer, MiddlewareSink};
use mcpmesh_core::route::{segment_to_template, HttpMethod, Route};

use crate::annotation::extract;
use crate::error::LoaderErrorEntry;
use crate::loader::HandlerLoader;
use crate::registry::RouteTableBuilder;

const MIDDLEWARE_STEM: &str = "middleware";

/// Walk `root` recursively, skipping test-pattern files, and classify
/// every remaining file as a handler, a middleware file, or neither.
fn candidate_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, &mut out)?;
    Ok(out)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if is_excluded_dir(&path) {
                continue;
            }
            walk(&path, out)?;
        } else if is_candidate_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_excluded_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n == "__tests__")
        .unwrap_or(false)
}

/// `*.test.*`, `*.spec.*` exclusion (§4.2 step 1).
fn is_test_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() >= 3 && (parts.contains(&"test") || parts.contains(&"spec"))
}

fn is_candidate_file(path: &Path) -> bool {
    if is_test_file(path) {
        return false;
    }
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}

/// Method token from a file stem: `get.so` → `get`, `[id].get.so` is
/// invalid (method must be the whole stem before the loader extension).
fn method_token(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

fn is_middleware_file(path: &Path) -> bool {
    method_token(path)
        .map(|stem| stem == MIDDLEWARE_STEM)
        .unwrap_or(false)
}

/// Leading template segment contributed by the discovery root itself
/// (e.g. `./api` → `api`), kept rather than stripped away so it survives
/// into the MCP tool name (§4.6, §8 S1: `api/users/get.js` → `api_users_get`).
fn root_segment(root: &Path) -> Option<String> {
    root.file_name()
        .and_then(|n| n.to_str())
        .map(segment_to_template)
        .filter(|s| !s.is_empty() && s != ".")
}

/// Compute the `{name}`-form URL template for a handler file relative to
/// the discovery root — the root's own directory name plus every path
/// segment except the final (method) segment contributes.
fn url_template_for(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut segments: Vec<String> = root_segment(root).into_iter().collect();
    if let Some(parent) = rel.parent() {
        segments.extend(
            parent
                .components()
                .map(|c| segment_to_template(&c.as_os_str().to_string_lossy())),
        );
    }
    let joined = segments.join("/");
    if joined.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", joined.trim_start_matches('/'))
    }
}

fn url_prefix_for(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let dir = rel.parent().unwrap_or_else(|| Path::new(""));
    let mut segments: Vec<String> = root_segment(root).into_iter().collect();
    segments.extend(
        dir.components()
            .map(|c| segment_to_template(&c.as_os_str().to_string_lossy())),
    );
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// One full (cold-start) or partial (reload) discovery pass over a set
/// of candidate files, writing into a [`RouteTableBuilder`] and a
/// [`MiddlewareSink`].
pub struct DiscoveryEngine<L: HandlerLoader> {
    root: PathBuf,
    loader: Arc<L>,
}

impl<L: HandlerLoader> DiscoveryEngine<L> {
    pub fn new(root: impl Into<PathBuf>, loader: Arc<L>) -> Self {
        Self {
            root: root.into(),
            loader,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the whole tree from scratch, producing a fresh table.
    pub fn full_scan(&self, middleware_sink: &dyn MiddlewareSink) -> std::io::Result<RouteTableBuilder> {
        let mut builder = RouteTableBuilder::new();
        let files = candidate_files(&self.root)?;
        for file in files {
            self.process_file(&file, &mut builder, middleware_sink);
        }
        Ok(builder)
    }

    /// Re-run discovery for exactly the given files, seeding the builder
    /// from `previous` so unaffected routes survive untouched (§4.4
    /// step 3).
    pub fn rescan_files(
        &self,
        previous: &crate::registry::RouteTable,
        changed: &[PathBuf],
        middleware_sink: &dyn MiddlewareSink,
    ) -> RouteTableBuilder {
        let mut builder = RouteTableBuilder::from_table(previous);
        for file in changed {
            middleware_sink.evict(file);
            self.loader.invalidate(file);
            if !file.exists() {
                builder.remove_file(file);
                continue;
            }
            self.process_file(file, &mut builder, middleware_sink);
        }
        builder
    }

    fn process_file(
        &self,
        file: &Path,
        builder: &mut RouteTableBuilder,
        middleware_sink: &dyn MiddlewareSink,
    ) {
        if is_middleware_file(file) {
            self.process_middleware(file, middleware_sink);
            return;
        }

        let Some(stem) = method_token(file) else {
            return;
        };
        let Some(method) = HttpMethod::from_token(&stem) else {
            builder.push_error(LoaderErrorEntry {
                file: file.to_path_buf(),
                category: "syntax".to_string(),
                message: format!("invalid method token {stem:?} in file name"),
            });
            return;
        };

        match self.loader.load(file) {
            Ok(module) => {
                let extraction = extract(&module);
                for warning in extraction.warnings {
                    tracing::warn!(file = %file.display(), "{warning}");
                }
                let url_template = url_template_for(&self.root, file);
                let mut bundle = extraction.bundle;
                bundle.reconcile_path_params(&mcpmesh_core::route::path_placeholders(
                    &url_template,
                ));
                let route = Route {
                    method,
                    url_template,
                    handler: module.handler,
                    file_path: file.to_path_buf(),
                    schema: bundle,
                };
                builder.upsert(route);
            }
            Err(crate::error::DiscoveryError::Load { path, source }) => {
                builder.push_error(LoaderErrorEntry::new(path, &source));
            }
            Err(other) => {
                builder.push_error(LoaderErrorEntry {
                    file: file.to_path_buf(),
                    category: "unknown".to_string(),
                    message: other.to_string(),
                });
            }
        }
    }

    fn process_middleware(&self, file: &Path, middleware_sink: &dyn MiddlewareSink) {
        match self.loader.load(file) {
            Ok(module) => {
                let prefix = url_prefix_for(&self.root, file);
                middleware_sink.install(MiddlewareLayer {
                    source_file: file.to_path_buf(),
                    url_prefix: prefix,
                    handlers: vec![module.handler.as_handler().clone()],
                });
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "failed to load middleware");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{LoadedModule, MockHandlerLoader};
    use mcpmesh_core::middleware::MiddlewareStack;
    use mcpmesh_core::route::{FnHandler, HandlerRef, ResponseCtx};
    use std::sync::Arc as StdArc;

    fn module() -> LoadedModule {
        LoadedModule {
            handler: HandlerRef::FuncHandler(StdArc::new(FnHandler(|_| async move {
                ResponseCtx::ok(serde_json::Value::Null)
            }))),
            explicit_schema: None,
            typed_request_schema: None,
            typed_response_schema: None,
            annotations: None,
        }
    }

    /// Mirrors §8 S1's literal file layout: discovery root is a
    /// directory named `api` (the `API_PATH=./api` default), so its own
    /// name survives into the url template alongside `users`/`{id}`.
    #[test]
    fn discovers_nested_routes_with_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("api");
        let users_dir = root.join("users");
        let id_dir = users_dir.join("[id]");
        std::fs::create_dir_all(&id_dir).unwrap();
        std::fs::write(users_dir.join("get.so"), b"").unwrap();
        std::fs::write(id_dir.join("get.so"), b"").unwrap();

        let loader = StdArc::new(MockHandlerLoader::new());
        loader.register(users_dir.join("get.so"), module());
        loader.register(id_dir.join("get.so"), module());

        let engine = DiscoveryEngine::new(root.as_path(), loader);
        let sink = MiddlewareStack::new();
        let table = engine.full_scan(&sink).unwrap().build();

        assert_eq!(table.len(), 2);
        assert!(table
            .get(&(HttpMethod::Get, "/api/users".to_string()))
            .is_some());
        assert!(table
            .get(&(HttpMethod::Get, "/api/users/{id}".to_string()))
            .is_some());
    }

    #[test]
    fn skips_test_pattern_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("get.test.so"), b"").unwrap();
        std::fs::write(dir.path().join("get.spec.so"), b"").unwrap();

        let loader = StdArc::new(MockHandlerLoader::new());
        let engine = DiscoveryEngine::new(dir.path(), loader);
        let sink = MiddlewareStack::new();
        let table = engine.full_scan(&sink).unwrap().build();

        assert_eq!(table.len(), 0);
    }

    #[test]
    fn invalid_method_token_records_error_not_route() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frobnicate.so"), b"").unwrap();

        let loader = StdArc::new(MockHandlerLoader::new());
        let engine = DiscoveryEngine::new(dir.path(), loader);
        let sink = MiddlewareStack::new();
        let table = engine.full_scan(&sink).unwrap().build();

        assert_eq!(table.len(), 0);
        assert_eq!(table.errors().len(), 1);
        assert_eq!(table.errors()[0].category, "syntax");
    }

    #[test]
    fn middleware_installs_on_directory_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let admin_dir = dir.path().join("admin");
        std::fs::create_dir_all(&admin_dir).unwrap();
        std::fs::write(admin_dir.join("middleware.so"), b"").unwrap();

        let loader = StdArc::new(MockHandlerLoader::new());
        loader.register(admin_dir.join("middleware.so"), module());

        let engine = DiscoveryEngine::new(dir.path(), loader);
        let sink = MiddlewareStack::new();
        engine.full_scan(&sink).unwrap();

        assert_eq!(sink.layer_count(), 1);
    }

    #[test]
    fn reload_removes_deleted_file_routes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("get.so"), b"").unwrap();

        let loader = StdArc::new(MockHandlerLoader::new());
        loader.register(dir.path().join("get.so"), module());

        let engine = DiscoveryEngine::new(dir.path(), loader);
        let sink = MiddlewareStack::new();
        let table = engine.full_scan(&sink).unwrap().build();
        assert_eq!(table.len(), 1);

        std::fs::remove_file(dir.path().join("get.so")).unwrap();
        let builder = engine.rescan_files(&table, &[dir.path().join("get.so")], &sink);
        let table2 = builder.build();
        assert_eq!(table2.len(), 0);
    }
}

//! Request-time route matching: turns an incoming `(method, path)` into
//! the [`Route`] it names plus the extracted path parameters, against a
//! live [`RouteTable`] snapshot. Used by the HTTP surface's dynamic
//! catch-all so routing stays hot-reloadable without rebuilding an axum
//! `Router` on every registry publish.

use std::collections::HashMap;

use mcpmesh_core::route::{HttpMethod, Route};

use crate::registry::RouteTable;

/// Find the route matching `method`/`path`, returning it alongside the
/// path parameters extracted from `{name}` segments.
pub fn match_route<'a>(
    table: &'a RouteTable,
    method: HttpMethod,
    path: &str,
) -> Option<(&'a Route, HashMap<String, String>)> {
    let path_segments: Vec<&str> = split_segments(path);

    table.valid_routes().find_map(|route| {
        if route.method != method {
            return None;
        }
        match_segments(&route.url_template, &path_segments)
            .map(|params| (route, params))
    })
}

fn split_segments(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

fn match_segments(template: &str, path_segments: &[&str]) -> Option<HashMap<String, String>> {
    let template_segments = split_segments(template);
    if template_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (tpl, actual) in template_segments.iter().zip(path_segments) {
        if let Some(name) = tpl.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            params.insert(name.to_string(), actual.to_string());
        } else if *tpl != *actual {
            return None;
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_core::route::{FnHandler, HandlerRef, ResponseCtx};
    use mcpmesh_core::schema::SchemaBundle;
    use crate::registry::RouteTableBuilder;
    use std::sync::Arc;

    fn route(method: HttpMethod, template: &str) -> Route {
        Route {
            method,
            url_template: template.to_string(),
            handler: HandlerRef::FuncHandler(Arc::new(FnHandler(|_| async move {
                ResponseCtx::ok(serde_json::Value::Null)
            }))),
            file_path: "a/get.so".into(),
            schema: SchemaBundle::default(),
        }
    }

    #[test]
    fn matches_literal_segments_and_extracts_placeholders() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route(HttpMethod::Get, "/users/{id}/posts/{postId}"));
        let table = builder.build();

        let (found, params) = match_route(&table, HttpMethod::Get, "/users/42/posts/7").unwrap();
        assert_eq!(found.url_template, "/users/{id}/posts/{postId}");
        assert_eq!(params.get("id"), Some(&"42".to_string()));
        assert_eq!(params.get("postId"), Some(&"7".to_string()));
    }

    #[test]
    fn mismatched_segment_count_does_not_match() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route(HttpMethod::Get, "/users/{id}"));
        let table = builder.build();
        assert!(match_route(&table, HttpMethod::Get, "/users/42/posts").is_none());
    }

    #[test]
    fn method_mismatch_does_not_match() {
        let mut builder = RouteTableBuilder::new();
        builder.upsert(route(HttpMethod::Get, "/users"));
        let table = builder.build();
        assert!(match_route(&table, HttpMethod::Post, "/users").is_none());
    }
}

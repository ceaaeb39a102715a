//! Annotation & schema extractor (C1, §4.1).

use serde_json::Value;

use mcpmesh_core::schema::SchemaBundle;

use crate::loader::LoadedModule;

/// Extraction result: the frozen bundle plus any non-fatal warnings
/// about malformed annotation bodies (§4.1: "extraction never fails the
/// route").
pub struct ExtractionResult {
    pub bundle: SchemaBundle,
    pub warnings: Vec<String>,
}

/// Build a [`SchemaBundle`] for one handler, merging in precedence order:
/// (a) explicit schema attached to the handler instance, (b) schemas
/// derived from a co-located typed `Request`/`Response` pair, (c)
/// doc-comment-equivalent annotations. Anything left unset falls back to
/// the documented defaults.
pub fn extract(module: &LoadedModule) -> ExtractionResult {
    let mut bundle = SchemaBundle::default();
    let mut warnings = Vec::new();

    // (c) lowest precedence: annotations fill in defaults first.
    if let Some(annotations) = &module.annotations {
        apply_annotations(&mut bundle, annotations, &mut warnings);
    }

    // (b) typed Request/Response schemas override annotation-derived ones.
    if let Some(req) = &module.typed_request_schema {
        bundle.body = Some(req.clone());
    }
    if let Some(resp) = &module.typed_response_schema {
        bundle.response = Some(resp.clone());
    }

    // (a) highest precedence: an explicit schema object wins outright.
    if let Some(explicit) = &module.explicit_schema {
        apply_explicit(&mut bundle, explicit, &mut warnings);
    }

    ExtractionResult { bundle, warnings }
}

fn apply_annotations(bundle: &mut SchemaBundle, annotations: &Value, warnings: &mut Vec<String>) {
    let Some(obj) = annotations.as_object() else {
        warnings.push("annotations value is not a JSON object; ignoring".to_string());
        return;
    };

    if let Some(v) = obj.get("description") {
        match v.as_str() {
            Some(s) => bundle.description = s.to_string(),
            None => warnings.push("@description annotation is not a string".to_string()),
        }
    }
    if let Some(v) = obj.get("summary") {
        match v.as_str() {
            Some(s) => bundle.summary = s.to_string(),
            None => warnings.push("@summary annotation is not a string".to_string()),
        }
    }
    if let Some(v) = obj.get("tags") {
        match v.as_array() {
            Some(arr) => {
                let tags: Vec<String> = arr
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect();
                if tags.len() == arr.len() && !tags.is_empty() {
                    bundle.tags = tags;
                } else {
                    warnings.push("@tags annotation contains non-string entries".to_string());
                }
            }
            None => warnings.push("@tags annotation is not an array".to_string()),
        }
    }
    if let Some(v) = obj.get("responseSchema") {
        if v.is_object() {
            bundle.response = Some(v.clone());
        } else {
            warnings.push("@responseSchema annotation is not an object".to_string());
        }
    }
    if let Some(v) = obj.get("param") {
        apply_param_annotations(bundle, v, warnings);
    }
}

/// `@param` annotations describe individual query fields:
/// `{"param": [{"name": "limit", "type": "integer", "required": true}]}`.
fn apply_param_annotations(bundle: &mut SchemaBundle, params: &Value, warnings: &mut Vec<String>) {
    let Some(arr) = params.as_array() else {
        warnings.push("@param annotation is not an array".to_string());
        return;
    };

    let mut query = bundle
        .query
        .take()
        .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));

    for entry in arr {
        let (Some(name), Some(ty)) = (
            entry.get("name").and_then(Value::as_str),
            entry.get("type").and_then(Value::as_str),
        ) else {
            warnings.push(format!("@param entry missing name/type: {entry}"));
            continue;
        };
        if let Some(props) = query.get_mut("properties").and_then(Value::as_object_mut) {
            props.insert(name.to_string(), serde_json::json!({ "type": ty }));
        }
        if entry.get("required").and_then(Value::as_bool) == Some(true) {
            let required = query
                .as_object_mut()
                .unwrap()
                .entry("required")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(arr) = required.as_array_mut() {
                arr.push(Value::String(name.to_string()));
            }
        }
    }

    bundle.query = Some(query);
}

fn apply_explicit(bundle: &mut SchemaBundle, explicit: &Value, warnings: &mut Vec<String>) {
    let Some(obj) = explicit.as_object() else {
        warnings.push("explicit schema value is not a JSON object; ignoring".to_string());
        return;
    };
    if let Some(v) = obj.get("body") {
        bundle.body = Some(v.clone());
    }
    if let Some(v) = obj.get("query") {
        bundle.query = Some(v.clone());
    }
    if let Some(v) = obj.get("path") {
        bundle.path = Some(v.clone());
    }
    if let Some(v) = obj.get("response") {
        bundle.response = Some(v.clone());
    }
    if let Some(v) = obj.get("summary").and_then(Value::as_str) {
        bundle.summary = v.to_string();
    }
    if let Some(v) = obj.get("description").and_then(Value::as_str) {
        bundle.description = v.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmesh_core::route::{FnHandler, HandlerRef};
    use std::sync::Arc;

    fn empty_module() -> LoadedModule {
        LoadedModule {
            handler: HandlerRef::FuncHandler(Arc::new(FnHandler(|ctx| async move {
                mcpmesh_core::route::ResponseCtx::ok(serde_json::json!(ctx.body))
            }))),
            explicit_schema: None,
            typed_request_schema: None,
            typed_response_schema: None,
            annotations: None,
        }
    }

    #[test]
    fn defaults_when_nothing_present() {
        let result = extract(&empty_module());
        assert_eq!(result.bundle.summary, "API endpoint summary");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn annotations_override_defaults() {
        let mut module = empty_module();
        module.annotations = Some(serde_json::json!({
            "description": "Fetch a widget",
            "summary": "Get widget",
            "tags": ["widgets"],
        }));
        let result = extract(&module);
        assert_eq!(result.bundle.description, "Fetch a widget");
        assert_eq!(result.bundle.summary, "Get widget");
        assert_eq!(result.bundle.tags, vec!["widgets".to_string()]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn malformed_annotation_produces_warning_not_failure() {
        let mut module = empty_module();
        module.annotations = Some(serde_json::json!({ "description": 42 }));
        let result = extract(&module);
        assert_eq!(result.bundle.description, "API endpoint description");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn explicit_schema_wins_over_annotations() {
        let mut module = empty_module();
        module.annotations = Some(serde_json::json!({ "description": "from annotation" }));
        module.explicit_schema = Some(serde_json::json!({ "description": "from explicit" }));
        let result = extract(&module);
        assert_eq!(result.bundle.description, "from explicit");
    }
}

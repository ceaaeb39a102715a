//! Schema bundle type and the small JSON-Schema helpers shared by the
//! OpenAPI synthesizer (C5) and MCP tool synthesizer (C6).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Defaults applied when annotation extraction (C1) finds nothing.
pub const DEFAULT_SUMMARY: &str = "API endpoint summary";
pub const DEFAULT_DESCRIPTION: &str = "API endpoint description";

/// The combined schema/annotation bundle for one route (§3).
///
/// Derived lazily by C1 and frozen into the [`crate::route::Route`] once
/// discovery loads a handler file; cached until the next reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaBundle {
    pub body: Option<Value>,
    pub query: Option<Value>,
    pub path: Option<Value>,
    pub response: Option<Value>,
    /// Per-status-code error response schemas.
    pub errors: BTreeMap<u16, Value>,
    pub summary: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl Default for SchemaBundle {
    fn default() -> Self {
        Self {
            body: None,
            query: None,
            path: None,
            response: None,
            errors: BTreeMap::new(),
            summary: DEFAULT_SUMMARY.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            tags: vec!["api".to_string()],
        }
    }
}

impl SchemaBundle {
    /// Ensure every path placeholder in `url_template` has a corresponding
    /// required string property in `self.path`, adding it if annotations
    /// didn't declare one (§4.1: "any placeholder in the URL template is
    /// added to the path schema as `{type: string, required: true}` even
    /// if absent from annotations").
    ///
    /// If a query field shares a name with a path parameter, the path
    /// parameter wins and the query field is dropped.
    pub fn reconcile_path_params(&mut self, placeholders: &[String]) {
        if placeholders.is_empty() {
            return;
        }
        let mut path_obj = self
            .path
            .take()
            .and_then(object_schema_parts)
            .unwrap_or_default();

        for name in placeholders {
            path_obj.properties.insert(
                name.clone(),
                serde_json::json!({ "type": "string" }),
            );
            if !path_obj.required.contains(name) {
                path_obj.required.push(name.clone());
            }
            if let Some(query_obj) = self.query.as_mut().and_then(Value::as_object_mut) {
                if let Some(props) = query_obj
                    .get_mut("properties")
                    .and_then(Value::as_object_mut)
                {
                    props.remove(name);
                }
                if let Some(req) = query_obj.get_mut("required").and_then(Value::as_array_mut) {
                    req.retain(|v| v.as_str() != Some(name.as_str()));
                }
            }
        }

        self.path = Some(path_obj.into_schema());
    }
}

/// Decomposed `{type: object, properties: {...}, required: [...]}` schema,
/// used internally while merging path-parameter requirements.
#[derive(Default)]
struct ObjectSchemaParts {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ObjectSchemaParts {
    fn into_schema(self) -> Value {
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String("object".to_string()));
        obj.insert("properties".to_string(), Value::Object(self.properties));
        if !self.required.is_empty() {
            obj.insert(
                "required".to_string(),
                Value::Array(self.required.into_iter().map(Value::String).collect()),
            );
        }
        Value::Object(obj)
    }
}

fn object_schema_parts(schema: Value) -> Option<ObjectSchemaParts> {
    let obj = schema.as_object()?;
    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Some(ObjectSchemaParts {
        properties,
        required,
    })
}

/// Recursively ensure every `{"type": "array"}` schema node carries an
/// `items` key, synthesizing `{}` when missing (§4.5, §4.6: "Arrays in
/// any emitted schema must always carry an `items` field").
pub fn ensure_array_items(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("array")
                && !map.contains_key("items")
            {
                map.insert("items".to_string(), Value::Object(Map::new()));
            }
            for value in map.values_mut() {
                ensure_array_items(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                ensure_array_items(item);
            }
        }
        _ => {}
    }
}

/// Flatten a JSON-Schema object's nested `properties` by one level:
/// `{properties: {body: {type: object, properties: {a: X, b: Y}}}}`
/// becomes top-level keys `body.a`, `body.b` (§4.6 / open question 4:
/// "at least first-level flattening" is required, deeper is allowed but
/// not required — this implementation stops at the first level).
pub fn flatten_one_level(schema: &Value) -> Map<String, Value> {
    let mut flattened = Map::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return flattened;
    };
    for (key, value) in properties {
        if value.get("type").and_then(Value::as_str) == Some("object") {
            if let Some(nested) = value.get("properties").and_then(Value::as_object) {
                if !nested.is_empty() {
                    for (nested_key, nested_value) in nested {
                        flattened.insert(format!("{key}.{nested_key}"), nested_value.clone());
                    }
                    continue;
                }
            }
        }
        flattened.insert(key.clone(), value.clone());
    }
    flattened
}

/// Required field names for a flattened schema, matching
/// [`flatten_one_level`]'s key shape (`parent.child` for nested-required
/// fields whose parent was itself required).
pub fn flatten_required(schema: &Value) -> Vec<String> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Vec::new();
    };
    required
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let bundle = SchemaBundle::default();
        assert_eq!(bundle.summary, DEFAULT_SUMMARY);
        assert_eq!(bundle.description, DEFAULT_DESCRIPTION);
        assert_eq!(bundle.tags, vec!["api".to_string()]);
    }

    #[test]
    fn reconcile_adds_missing_path_param() {
        let mut bundle = SchemaBundle::default();
        bundle.reconcile_path_params(&["id".to_string()]);
        let path = bundle.path.unwrap();
        assert_eq!(path["properties"]["id"]["type"], "string");
        assert_eq!(path["required"][0], "id");
    }

    #[test]
    fn reconcile_drops_conflicting_query_field() {
        let mut bundle = SchemaBundle::default();
        bundle.query = Some(serde_json::json!({
            "type": "object",
            "properties": { "id": {"type": "integer"}, "limit": {"type": "integer"} },
            "required": ["id"]
        }));
        bundle.reconcile_path_params(&["id".to_string()]);
        let query = bundle.query.unwrap();
        assert!(query["properties"].get("id").is_none());
        assert!(query["properties"].get("limit").is_some());
        let path = bundle.path.unwrap();
        assert_eq!(path["properties"]["id"]["type"], "string");
    }

    #[test]
    fn array_items_synthesized() {
        let mut schema = serde_json::json!({
            "type": "object",
            "properties": { "tags": { "type": "array" } }
        });
        ensure_array_items(&mut schema);
        assert_eq!(schema["properties"]["tags"]["items"], serde_json::json!({}));
    }

    #[test]
    fn flatten_first_level() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": { "name": {"type": "string"}, "age": {"type": "integer"} }
                },
                "flag": {"type": "boolean"}
            }
        });
        let flattened = flatten_one_level(&schema);
        assert!(flattened.contains_key("user.name"));
        assert!(flattened.contains_key("user.age"));
        assert!(flattened.contains_key("flag"));
    }
}

//! Schema adapter (C9, §4.9): a data-driven lookup table that remaps a
//! call's arguments to the shape an external tool expects.

use std::collections::HashMap;

use serde_json::Value;

/// One adapter function: takes the caller's argument object, returns the
/// object the bridge tool actually expects.
pub type AdapterFn = fn(&Value) -> Value;

/// Lookup table keyed by tool name. Built as data, not per-call
/// conditionals, so new adaptations are additions to the table rather
/// than branches in the dispatch path.
#[derive(Default, Clone)]
pub struct SchemaAdapterTable {
    adapters: HashMap<String, AdapterFn>,
}

impl SchemaAdapterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool_name: impl Into<String>, adapter: AdapterFn) {
        self.adapters.insert(tool_name.into(), adapter);
    }

    /// Adapt `arguments` for `tool_name`. Unknown tool names pass through
    /// unchanged.
    pub fn adapt(&self, tool_name: &str, arguments: &Value) -> Value {
        match self.adapters.get(tool_name) {
            Some(adapter) => adapter(arguments),
            None => arguments.clone(),
        }
    }
}

/// Example adapter matching S6 in the testable-scenarios list: a bridge
/// tool named `click` expects `{uid, dblClick}` rather than
/// `{element_id, doubleClick}`.
pub fn click_adapter(args: &Value) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(id) = args.get("element_id") {
        out.insert("uid".to_string(), id.clone());
    }
    if let Some(double) = args.get("doubleClick") {
        out.insert("dblClick".to_string(), double.clone());
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tool_passes_through_unchanged() {
        let table = SchemaAdapterTable::new();
        let args = json!({"a": 1});
        assert_eq!(table.adapt("anything", &args), args);
    }

    #[test]
    fn click_adapter_renames_fields() {
        let mut table = SchemaAdapterTable::new();
        table.register("click", click_adapter);
        let args = json!({"element_id": "e1", "doubleClick": true});
        let adapted = table.adapt("click", &args);
        assert_eq!(adapted, json!({"uid": "e1", "dblClick": true}));
    }
}

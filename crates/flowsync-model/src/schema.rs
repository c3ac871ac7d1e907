//! Schema definition overlays
//!
//! Port schemas may declare reusable definitions under `$defs`. Definitions
//! flagged `"configurable": true` are user-editable and travel with the
//! node; the builder overlays them onto stored edge schemas, which may be
//! older than the node that produced them.

use crate::node::Node;
use serde_json::{Map, Value};

const DEFS: &str = "$defs";
const CONFIGURABLE: &str = "configurable";

/// Named schema definitions
pub type Definitions = Map<String, Value>;

fn collect_configurable(schema: &Value, out: &mut Definitions) {
    let Some(defs) = schema.get(DEFS).and_then(Value::as_object) else {
        return;
    };
    for (name, def) in defs {
        if def.get(CONFIGURABLE).and_then(Value::as_bool) == Some(true) {
            out.insert(name.clone(), def.clone());
        }
    }
}

/// Configurable definitions declared by `node`.
///
/// With `from`, only the edge-level port configurations fed by that upstream
/// port are consulted. Without it, the node's own port schemas (runtime
/// status and handle-level configuration) are.
#[must_use]
pub fn configurable_definitions(node: &Node, from: Option<&str>) -> Definitions {
    let mut out = Definitions::new();
    match from {
        Some(from) => {
            for pc in node.spec.ports.iter().filter(|pc| pc.from.as_deref() == Some(from)) {
                if let Some(schema) = &pc.schema {
                    collect_configurable(schema, &mut out);
                }
            }
        }
        None => {
            for status in &node.status.ports {
                if let Some(schema) = &status.schema {
                    collect_configurable(schema, &mut out);
                }
            }
            for pc in node.spec.ports.iter().filter(|pc| pc.is_handle_level()) {
                if let Some(schema) = &pc.schema {
                    collect_configurable(schema, &mut out);
                }
            }
        }
    }
    out
}

/// Replaces definitions in `schema` that `defs` also declares.
///
/// Definitions the schema does not reference are not added.
#[must_use]
pub fn overlay_definitions(schema: &Value, defs: &Definitions) -> Value {
    let mut schema = schema.clone();
    if defs.is_empty() {
        return schema;
    }
    if let Some(existing) = schema.get_mut(DEFS).and_then(Value::as_object_mut) {
        for (name, def) in defs {
            if let Some(slot) = existing.get_mut(name) {
                *slot = def.clone();
            }
        }
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ComponentRef, PortConfig, PortStatus};
    use crate::port::PortRef;
    use serde_json::json;

    fn schema_with(defs: Value) -> Value {
        json!({ "type": "object", "$defs": defs })
    }

    #[test]
    fn collects_only_configurable() {
        let mut n = Node::new("a", "p", "g", ComponentRef::new("m", "c"));
        n.status.ports.push(PortStatus {
            name: "out".into(),
            schema: Some(schema_with(json!({
                "Context": { "configurable": true, "type": "string" },
                "Fixed": { "type": "number" }
            }))),
            ..PortStatus::default()
        });
        let defs = configurable_definitions(&n, None);
        assert_eq!(defs.len(), 1);
        assert!(defs.contains_key("Context"));
    }

    #[test]
    fn from_filter_reads_edge_configs() {
        let mut n = Node::new("b", "p", "g", ComponentRef::new("m", "c"));
        n.upsert_port_config(
            PortConfig::edge(&PortRef::new("a", "out"), "in").with_schema(schema_with(json!({
                "Context": { "configurable": true, "type": "integer" }
            }))),
        );
        assert_eq!(configurable_definitions(&n, Some("a:out")).len(), 1);
        assert!(configurable_definitions(&n, Some("x:out")).is_empty());
        assert!(configurable_definitions(&n, None).is_empty());
    }

    #[test]
    fn overlay_replaces_only_known_definitions() {
        let base = schema_with(json!({ "Context": { "type": "string" } }));
        let mut defs = Definitions::new();
        defs.insert("Context".into(), json!({ "configurable": true, "type": "object" }));
        defs.insert("Other".into(), json!({ "type": "null" }));
        let merged = overlay_definitions(&base, &defs);
        assert_eq!(merged["$defs"]["Context"]["type"], "object");
        assert!(merged["$defs"].get("Other").is_none());
    }
}

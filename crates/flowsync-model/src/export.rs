//! Versioned project export document

use crate::error::ModelError;
use crate::node::{ComponentRef, Position};
use crate::page::WidgetPlacement;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only document version this build reads or writes
pub const CURRENT_EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub graphs: Vec<ExportGraph>,
    #[serde(default)]
    pub elements: Vec<ExportElement>,
    #[serde(default)]
    pub pages: Vec<ExportPage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportGraph {
    pub resource_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExportElement {
    Node(ExportNode),
    Edge(ExportEdge),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportNode {
    pub id: String,
    pub owning_graph: String,
    pub component: ComponentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub rotation: u8,
    #[serde(default)]
    pub dashboard: bool,
    #[serde(default)]
    pub handles: Vec<ExportHandle>,
}

/// Handle-level port configuration of an exported node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportHandle {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ExportHandle {
    /// A handle carries something worth storing unless both parts are empty.
    /// `{}` and `null` configurations count as empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let empty = |v: &Option<Value>| match v {
            None | Some(Value::Null) => true,
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        };
        empty(&self.configuration) && empty(&self.schema)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEdge {
    pub id: String,
    pub owning_graph: String,
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPage {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub sort_index: i32,
    #[serde(default)]
    pub widgets: Vec<WidgetPlacement>,
}

impl ExportDocument {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            version: CURRENT_EXPORT_VERSION,
            description: description.into(),
            graphs: Vec::new(),
            elements: Vec::new(),
            pages: Vec::new(),
        }
    }

    /// Decodes a document, rejecting any version other than the current one
    /// before looking at the rest of the payload.
    pub fn from_json(raw: &str) -> Result<Self, ModelError> {
        let value: Value = serde_json::from_str(raw)?;
        let found = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| ModelError::MalformedDocument("missing numeric 'version'".into()))?;
        let found = u32::try_from(found)
            .map_err(|_| ModelError::MalformedDocument(format!("version {found} out of range")))?;
        ensure_supported(found)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Rejects documents built for another export version
    pub fn check_version(&self) -> Result<(), ModelError> {
        ensure_supported(self.version)
    }

    pub fn to_json_pretty(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExportNode> {
        self.elements.iter().filter_map(|e| match e {
            ExportElement::Node(n) => Some(n),
            ExportElement::Edge(_) => None,
        })
    }

    pub fn edges(&self) -> impl Iterator<Item = &ExportEdge> {
        self.elements.iter().filter_map(|e| match e {
            ExportElement::Edge(edge) => Some(edge),
            ExportElement::Node(_) => None,
        })
    }
}

fn ensure_supported(found: u32) -> Result<(), ModelError> {
    if found == CURRENT_EXPORT_VERSION {
        Ok(())
    } else {
        Err(ModelError::UnsupportedVersion {
            found,
            expected: CURRENT_EXPORT_VERSION,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_other_versions() {
        let raw = json!({ "version": 2, "elements": [{ "type": "bogus" }] }).to_string();
        assert_eq!(
            ExportDocument::from_json(&raw),
            Err(ModelError::UnsupportedVersion { found: 2, expected: 1 })
        );
        assert!(matches!(
            ExportDocument::from_json("{}"),
            Err(ModelError::MalformedDocument(_))
        ));
    }

    #[test]
    fn decodes_tagged_elements() {
        let raw = json!({
            "version": 1,
            "description": "demo",
            "graphs": [{ "resourceName": "g-1", "name": "Main" }],
            "elements": [
                { "type": "node", "id": "router-ab12c", "owningGraph": "g-1",
                  "component": { "module": "common", "component": "router" } },
                { "type": "edge", "id": "e1", "owningGraph": "g-1",
                  "source": "router-ab12c", "sourcePort": "out",
                  "target": "sink-xy", "targetPort": "in" }
            ],
            "pages": []
        })
        .to_string();
        let doc = ExportDocument::from_json(&raw).unwrap();
        assert_eq!(doc.nodes().count(), 1);
        assert_eq!(doc.edges().count(), 1);
        assert_eq!(doc.nodes().next().unwrap().rotation, 0);

        let mut doc = doc;
        assert!(doc.check_version().is_ok());
        doc.version = 3;
        assert_eq!(
            doc.check_version(),
            Err(ModelError::UnsupportedVersion { found: 3, expected: 1 })
        );
    }

    #[test]
    fn empty_handles() {
        let mut h = ExportHandle { id: "in".into(), configuration: Some(json!({})), schema: None };
        assert!(h.is_empty());
        h.configuration = Some(Value::Null);
        assert!(h.is_empty());
        h.schema = Some(json!({ "type": "string" }));
        assert!(!h.is_empty());
    }
}

//! Presentation records produced by the graph builder
//!
//! Every element pushed to the presentation layer is one of these typed
//! records, discriminated by `kind`.

use crate::node::{ComponentRef, PortDirection, Position};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    pub graph_id: String,
    pub component: ComponentRef,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub position: Position,
    pub rotation: u8,
    pub dashboard: bool,
    /// Rendered but owned by another graph
    pub blocked: bool,
    /// Visible through the sharing list
    pub shared: bool,
    pub handles: Vec<HandleRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleRecord {
    pub id: String,
    pub label: String,
    pub direction: PortDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: String,
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
    pub graph_id: String,
    pub valid: bool,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Leaf validation message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-field validation messages keyed by instance location
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

/// Degraded edge whose target could not be resolved; never valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackEdgeRecord {
    pub id: String,
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
    pub graph_id: String,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GraphElement {
    Node(NodeRecord),
    Edge(EdgeRecord),
    FallbackEdge(FallbackEdgeRecord),
}

impl GraphElement {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Node(n) => &n.id,
            Self::Edge(e) => &e.id,
            Self::FallbackEdge(e) => &e.id,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_edge(&self) -> bool {
        !matches!(self, Self::Node(_))
    }

    /// Validity of an edge element; nodes are always valid
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Node(_) => true,
            Self::Edge(e) => e.valid,
            Self::FallbackEdge(e) => e.valid,
        }
    }
}

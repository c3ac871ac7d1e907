//! Node resources as stored in the object store
//!
//! A node is the unit of storage: it owns its outgoing edges and the port
//! configurations that apply to its own ports, including edge-specific
//! overrides keyed by the upstream port that feeds them.

use crate::error::ModelError;
use crate::keys;
use crate::port::PortRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Node resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Identifier, unique within the namespace
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub spec: NodeSpec,
    #[serde(default)]
    pub status: NodeStatus,
    /// Store-internal identity; never carried across a copy
    #[serde(default)]
    pub meta: StoreMeta,
}

/// Declared component reference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRef {
    pub module: String,
    pub component: String,
    #[serde(default)]
    pub version: String,
}

impl ComponentRef {
    #[inline]
    #[must_use]
    pub fn new(module: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            component: component.into(),
            version: String::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Desired state of a node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub component: ComponentRef,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

/// Outgoing edge owned by its source node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    /// Source port on the owning node
    pub port: String,
    /// Target reference, "node:port"
    pub to: String,
    #[serde(default)]
    pub graph_id: String,
}

impl Edge {
    #[must_use]
    pub fn new(id: impl Into<String>, port: impl Into<String>, to: &PortRef, graph_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            port: port.into(),
            to: to.to_string(),
            graph_id: graph_id.into(),
        }
    }

    /// Parsed target reference
    pub fn target(&self) -> Result<PortRef, ModelError> {
        self.to.parse()
    }

    /// Node part of the target, even when the port part is malformed
    #[must_use]
    pub fn target_node(&self) -> &str {
        self.to
            .split_once(keys::PORT_SEPARATOR)
            .map_or(self.to.as_str(), |(node, _)| node)
    }

    /// Deterministic id used for edges materialized from documents
    #[must_use]
    pub fn derived_id(source: &PortRef, target: &PortRef) -> String {
        format!("{}_{}-{}_{}", source.node, source.port, target.node, target.port)
    }
}

/// Port configuration attached to one of the node's own ports
///
/// Without `from` it is the handle-level default for the port; with `from`
/// it overrides the configuration for the edge arriving from that upstream
/// port.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    pub port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default)]
    pub graph_id: String,
}

impl PortConfig {
    /// Handle-level configuration for `port`
    #[must_use]
    pub fn handle(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Edge-level configuration for the edge arriving at `port` from `from`
    #[must_use]
    pub fn edge(from: &PortRef, port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            from: Some(from.to_string()),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = Some(configuration);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_graph(mut self, graph_id: impl Into<String>) -> Self {
        self.graph_id = graph_id.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn is_handle_level(&self) -> bool {
        self.from.as_deref().map_or(true, str::is_empty)
    }

    /// Merge key: (from, port)
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (self.from.as_deref().unwrap_or(""), self.port.as_str())
    }
}

/// Observed state reported by the runtime
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub ports: Vec<PortStatus>,
}

/// Port declared by the running component
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortStatus {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(default)]
    pub direction: PortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    #[default]
    Input,
    Output,
}

/// Store-assigned identity fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<String>,
}

/// Canvas position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Node {
    /// New node owned by `graph` in `project`
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        graph: impl Into<String>,
        component: ComponentRef,
    ) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(keys::PROJECT_LABEL.to_string(), project.into());
        labels.insert(keys::GRAPH_LABEL.to_string(), graph.into());
        Self {
            name: name.into(),
            labels,
            spec: NodeSpec {
                component,
                ..NodeSpec::default()
            },
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn owning_graph(&self) -> Option<&str> {
        self.labels.get(keys::GRAPH_LABEL).map(String::as_str)
    }

    #[inline]
    #[must_use]
    pub fn is_owned_by(&self, graph: &str) -> bool {
        self.owning_graph() == Some(graph)
    }

    pub fn set_owning_graph(&mut self, graph: impl Into<String>) {
        self.labels.insert(keys::GRAPH_LABEL.to_string(), graph.into());
    }

    #[inline]
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.labels.get(keys::PROJECT_LABEL).map(String::as_str)
    }

    /// Graphs this node is shared into
    pub fn shared_with(&self) -> impl Iterator<Item = &str> {
        self.annotations
            .get(keys::SHARED_WITH)
            .map(String::as_str)
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }

    #[must_use]
    pub fn is_shared_with(&self, graph: &str) -> bool {
        self.shared_with().any(|g| g == graph)
    }

    /// Appends `graph` to the sharing list; returns false when already present
    pub fn add_shared_graph(&mut self, graph: &str) -> bool {
        if self.is_shared_with(graph) {
            return false;
        }
        let mut graphs: Vec<&str> = self.shared_with().collect();
        graphs.push(graph);
        let joined = graphs.join(",");
        self.annotations.insert(keys::SHARED_WITH.to_string(), joined);
        true
    }

    pub fn clear_sharing(&mut self) {
        self.annotations.remove(keys::SHARED_WITH);
    }

    /// Drops store-assigned identity so the node can be created as a new object
    pub fn strip_store_identity(&mut self) {
        self.meta = StoreMeta::default();
    }

    /// Repoints edge targets and edge-level `from` references through `mapping`
    /// (old node name to new node name). Returns true if anything changed.
    pub fn rewrite_references(&mut self, mapping: &HashMap<String, String>) -> bool {
        let mut changed = false;
        for edge in &mut self.spec.edges {
            if let Ok(target) = edge.target() {
                if let Some(new_name) = mapping.get(&target.node) {
                    edge.to = target.with_node(new_name.as_str()).to_string();
                    changed = true;
                }
            }
        }
        for pc in &mut self.spec.ports {
            let Some(from) = pc.from.as_deref() else { continue };
            if let Ok(source) = from.parse::<PortRef>() {
                if let Some(new_name) = mapping.get(&source.node) {
                    pc.from = Some(source.with_node(new_name.as_str()).to_string());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Whether any edge targets `node`
    #[must_use]
    pub fn references(&self, node: &str) -> bool {
        self.spec.edges.iter().any(|e| e.target_node() == node)
    }

    #[must_use]
    pub fn position(&self) -> Position {
        Position {
            x: self.annotation_f64(keys::POSITION_X).unwrap_or_default(),
            y: self.annotation_f64(keys::POSITION_Y).unwrap_or_default(),
        }
    }

    pub fn set_position(&mut self, position: Position) {
        self.annotations
            .insert(keys::POSITION_X.to_string(), position.x.to_string());
        self.annotations
            .insert(keys::POSITION_Y.to_string(), position.y.to_string());
    }

    /// Quarter turns, 0..=3
    #[must_use]
    pub fn rotation(&self) -> u8 {
        self.annotations
            .get(keys::ROTATION)
            .and_then(|v| v.parse::<u8>().ok())
            .map_or(0, |r| r % 4)
    }

    pub fn set_rotation(&mut self, rotation: u8) {
        self.annotations
            .insert(keys::ROTATION.to_string(), (rotation % 4).to_string());
    }

    #[must_use]
    pub fn display_label(&self) -> Option<&str> {
        self.annotations
            .get(keys::DISPLAY_LABEL)
            .map(String::as_str)
            .filter(|l| !l.is_empty())
    }

    pub fn set_display_label(&mut self, label: impl Into<String>) {
        self.annotations
            .insert(keys::DISPLAY_LABEL.to_string(), label.into());
    }

    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.annotations
            .get(keys::COMMENT)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.annotations.insert(keys::COMMENT.to_string(), comment.into());
    }

    #[must_use]
    pub fn is_dashboard(&self) -> bool {
        self.labels
            .get(keys::DASHBOARD_LABEL)
            .is_some_and(|v| v == "true")
    }

    pub fn set_dashboard(&mut self, enabled: bool) {
        if enabled {
            self.labels
                .insert(keys::DASHBOARD_LABEL.to_string(), "true".to_string());
        } else {
            self.labels.remove(keys::DASHBOARD_LABEL);
        }
    }

    #[must_use]
    pub fn port_status(&self, port: &str) -> Option<&PortStatus> {
        self.status.ports.iter().find(|p| p.name == port)
    }

    #[must_use]
    pub fn handle_config(&self, port: &str) -> Option<&PortConfig> {
        self.spec
            .ports
            .iter()
            .find(|pc| pc.is_handle_level() && pc.port == port)
    }

    #[must_use]
    pub fn edge_config(&self, from: &str, port: &str) -> Option<&PortConfig> {
        self.spec
            .ports
            .iter()
            .find(|pc| pc.from.as_deref() == Some(from) && pc.port == port)
    }

    /// Inserts or replaces the configuration sharing `config`'s (from, port) key
    pub fn upsert_port_config(&mut self, config: PortConfig) {
        let key = (config.key().0.to_string(), config.port.clone());
        match self
            .spec
            .ports
            .iter_mut()
            .find(|pc| pc.key() == (key.0.as_str(), key.1.as_str()))
        {
            Some(existing) => *existing = config,
            None => self.spec.ports.push(config),
        }
    }

    /// Removes edge-level configurations fed by `from`
    pub fn remove_edge_configs_from(&mut self, from: &str) -> usize {
        let before = self.spec.ports.len();
        self.spec.ports.retain(|pc| pc.from.as_deref() != Some(from));
        before - self.spec.ports.len()
    }

    /// Inserts or replaces the edge with the same id
    pub fn upsert_edge(&mut self, edge: Edge) {
        match self.spec.edges.iter_mut().find(|e| e.id == edge.id) {
            Some(existing) => *existing = edge,
            None => self.spec.edges.push(edge),
        }
    }

    pub fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let idx = self.spec.edges.iter().position(|e| e.id == id)?;
        Some(self.spec.edges.remove(idx))
    }

    fn annotation_f64(&self, key: &str) -> Option<f64> {
        self.annotations.get(key).and_then(|v| v.parse().ok())
    }
}

//! Graph builder
//!
//! Turns a cache snapshot into presentation records for one focus graph:
//! - visibility (owned, shared, blocked) per node
//! - edge resolution with a fallback record for unknown targets
//! - edge configuration and schema with configurable definitions overlaid
//! - validation through the external validator, bounded by a timeout
//!
//! Output depends only on the snapshot, the focus graph and the validator's
//! answers; nodes are visited in name order and edges in declaration order.

use crate::visibility::{BuildScope, Visibility};
use flowsync_gateway::{EdgeCheck, EdgeValidator, NodeIndex};
use flowsync_model::schema::{configurable_definitions, overlay_definitions};
use flowsync_model::{
    Edge, EdgeRecord, FallbackEdgeRecord, GraphElement, HandleRecord, Node, NodeRecord, PortRef,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Build parameters
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub scope: BuildScope,
    /// Observed payloads keyed by full source port ("node:port")
    pub runtime_samples: BTreeMap<String, Value>,
}

impl BuildOptions {
    #[inline]
    #[must_use]
    pub fn with_scope(mut self, scope: BuildScope) -> Self {
        self.scope = scope;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_runtime_sample(mut self, port: &PortRef, sample: Value) -> Self {
        self.runtime_samples.insert(port.to_string(), sample);
        self
    }
}

/// Records for one node: its edges, then the node itself
#[derive(Debug, Clone, PartialEq)]
pub struct NodeElements {
    pub node: NodeRecord,
    pub edges: Vec<GraphElement>,
}

/// Full build output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltGraph {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<GraphElement>,
}

impl BuiltGraph {
    /// Nodes first, then edges
    #[must_use]
    pub fn into_elements(self) -> Vec<GraphElement> {
        self.nodes
            .into_iter()
            .map(GraphElement::Node)
            .chain(self.edges)
            .collect()
    }
}

#[derive(Clone)]
pub struct GraphBuilder {
    validator: Arc<dyn EdgeValidator>,
    timeout: Duration,
}

impl std::fmt::Debug for GraphBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new(validator: Arc<dyn EdgeValidator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }

    /// Builds every node rendered in `focus`
    pub async fn build(&self, nodes: &NodeIndex, focus: &str, options: &BuildOptions) -> BuiltGraph {
        let mut built = BuiltGraph::default();
        for node in nodes.values() {
            if let Some(elements) = self.node_elements(nodes, node, focus, options).await {
                built.nodes.push(elements.node);
                built.edges.extend(elements.edges);
            }
        }
        built
    }

    /// Records for a single node, or `None` when it is not rendered in `focus`
    pub async fn node_elements(
        &self,
        nodes: &NodeIndex,
        node: &Node,
        focus: &str,
        options: &BuildOptions,
    ) -> Option<NodeElements> {
        let visibility = Visibility::of(node, focus);
        if !visibility.rendered(options.scope) {
            return None;
        }
        let mut edges = Vec::with_capacity(node.spec.edges.len());
        for edge in &node.spec.edges {
            let sample = options
                .runtime_samples
                .get(&PortRef::new(node.name.as_str(), edge.port.as_str()).to_string());
            edges.push(self.edge_element(nodes, node, visibility, edge, focus, sample).await);
        }
        Some(NodeElements {
            node: node_record(node, visibility),
            edges,
        })
    }

    /// Record for one outgoing edge of `source`
    pub async fn edge_element(
        &self,
        nodes: &NodeIndex,
        source: &Node,
        source_visibility: Visibility,
        edge: &Edge,
        focus: &str,
        runtime_sample: Option<&Value>,
    ) -> GraphElement {
        let target_ref = edge.target().ok();
        let Some((target_ref, target)) =
            target_ref.and_then(|r| nodes.get(&r.node).map(|n| (r, n)))
        else {
            return GraphElement::FallbackEdge(fallback_edge(source, edge));
        };

        let from = PortRef::new(source.name.as_str(), edge.port.as_str());
        let from_str = from.to_string();

        // Source definitions win: the source node may have been edited after
        // the stored edge schema was written.
        let mut defs = configurable_definitions(target, Some(&from_str));
        defs.extend(configurable_definitions(source, None));

        let (configuration, schema) = match target.edge_config(&from_str, &target_ref.port) {
            Some(pc) => {
                let base = target
                    .port_status(&target_ref.port)
                    .and_then(|s| s.schema.as_ref())
                    .or(pc.schema.as_ref());
                (
                    pc.configuration.clone(),
                    base.map(|s| overlay_definitions(s, &defs)),
                )
            }
            None => (None, None),
        };

        let blocked = Visibility::edge_blocked(source_visibility, Visibility::of(target, focus));

        let mut record = EdgeRecord {
            id: edge.id.clone(),
            source: source.name.clone(),
            source_port: edge.port.clone(),
            target: target_ref.node.clone(),
            target_port: target_ref.port.clone(),
            graph_id: edge_graph(source, edge),
            valid: false,
            blocked,
            configuration,
            schema,
            error: None,
            errors: BTreeMap::new(),
        };

        let check = EdgeCheck {
            source_port: from,
            configuration: record.configuration.clone(),
            schema: record.schema.clone(),
            runtime_sample: runtime_sample.cloned(),
        };
        match tokio::time::timeout(self.timeout, self.validator.validate_edge(nodes, &check)).await {
            Ok(Ok(())) => record.valid = true,
            Ok(Err(failure)) => {
                record.error = Some(failure.summary());
                record.errors = failure.field_errors();
            }
            Err(_) => {
                let msg = format!("validation timed out after {}ms", self.timeout.as_millis());
                tracing::warn!(edge = %edge.id, "{msg}");
                record.errors.insert("error".to_string(), msg.clone());
                record.error = Some(msg);
            }
        }
        GraphElement::Edge(record)
    }
}

/// Presentation record for a node
#[must_use]
pub fn node_record(node: &Node, visibility: Visibility) -> NodeRecord {
    let mut handles: Vec<HandleRecord> = node
        .status
        .ports
        .iter()
        .map(|status| {
            let config = node.handle_config(&status.name);
            HandleRecord {
                id: status.name.clone(),
                label: status.label.clone(),
                direction: status.direction,
                schema: config
                    .and_then(|pc| pc.schema.clone())
                    .or_else(|| status.schema.clone()),
                configuration: config
                    .and_then(|pc| pc.configuration.clone())
                    .or_else(|| status.configuration.clone()),
            }
        })
        .collect();
    // Configured ports the runtime has not reported yet
    for pc in node.spec.ports.iter().filter(|pc| pc.is_handle_level()) {
        if node.port_status(&pc.port).is_none() {
            handles.push(HandleRecord {
                id: pc.port.clone(),
                label: pc.port.clone(),
                direction: flowsync_model::PortDirection::Input,
                schema: pc.schema.clone(),
                configuration: pc.configuration.clone(),
            });
        }
    }

    NodeRecord {
        id: node.name.clone(),
        graph_id: node.owning_graph().unwrap_or_default().to_string(),
        component: node.spec.component.clone(),
        label: node
            .display_label()
            .unwrap_or(node.spec.component.component.as_str())
            .to_string(),
        comment: node.comment().map(str::to_string),
        position: node.position(),
        rotation: node.rotation(),
        dashboard: node.is_dashboard(),
        blocked: visibility.blocked(),
        shared: visibility.shared,
        handles,
    }
}

fn edge_graph(source: &Node, edge: &Edge) -> String {
    if edge.graph_id.is_empty() {
        source.owning_graph().unwrap_or_default().to_string()
    } else {
        edge.graph_id.clone()
    }
}

fn fallback_edge(source: &Node, edge: &Edge) -> FallbackEdgeRecord {
    let (target, target_port) = match edge.target() {
        Ok(r) => (r.node, r.port),
        Err(_) => (edge.target_node().to_string(), String::new()),
    };
    FallbackEdgeRecord {
        id: edge.id.clone(),
        source: source.name.clone(),
        source_port: edge.port.clone(),
        target,
        target_port,
        graph_id: edge_graph(source, edge),
        valid: false,
    }
}

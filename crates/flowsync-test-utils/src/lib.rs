//! Testing utilities for the flowsync workspace
//!
//! Shared fixtures, a recording sink and scripted validators.

#![allow(missing_docs)]

use async_trait::async_trait;
use flowsync_core::{GraphUpdate, NodeUpdate, SyncError, UpdateSink};
use flowsync_gateway::{EdgeCheck, EdgeFailure, EdgeValidator, NodeIndex, PortProbe};
use flowsync_model::{ComponentRef, Edge, Node, PortConfig, PortRef, PortStatus};
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

pub const PROJECT: &str = "proj";

pub fn node(name: &str, graph: &str) -> Node {
    Node::new(name, PROJECT, graph, ComponentRef::new("common", "router"))
}

/// Node with an outgoing `out -> {target}:in` edge
pub fn node_with_edge(name: &str, graph: &str, target: &str) -> Node {
    let mut n = node(name, graph);
    let to = PortRef::new(target, "in");
    n.upsert_edge(Edge::new(
        Edge::derived_id(&PortRef::new(name, "out"), &to),
        "out",
        &to,
        graph,
    ));
    n
}

/// Dashboard node exposing a control port
pub fn dashboard_node(name: &str, graph: &str) -> Node {
    let mut n = Node::new(name, PROJECT, graph, ComponentRef::new("common", "button"));
    n.set_dashboard(true);
    n.status.ports.push(PortStatus {
        name: flowsync_model::keys::CONTROL_PORT.into(),
        schema: Some(serde_json::json!({ "type": "object" })),
        ..PortStatus::default()
    });
    n
}

pub fn handle(port: &str, configuration: Value) -> PortConfig {
    PortConfig::handle(port).with_configuration(configuration)
}

/// Sink that keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    graph: Mutex<Vec<GraphUpdate>>,
    nodes: Mutex<Vec<NodeUpdate>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph_updates(&self) -> Vec<GraphUpdate> {
        self.graph.lock().clone()
    }

    /// Graph updates other than heartbeats
    pub fn changes(&self) -> Vec<GraphUpdate> {
        self.graph
            .lock()
            .iter()
            .filter(|u| !matches!(u, GraphUpdate::Tick))
            .cloned()
            .collect()
    }

    pub fn ticks(&self) -> usize {
        self.graph
            .lock()
            .iter()
            .filter(|u| matches!(u, GraphUpdate::Tick))
            .count()
    }

    pub fn node_updates(&self) -> Vec<NodeUpdate> {
        self.nodes.lock().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().clone()
    }

    pub fn clear(&self) {
        self.graph.lock().clear();
        self.nodes.lock().clear();
        self.failures.lock().clear();
    }

    /// Polls until `check` holds or `timeout` elapses
    pub async fn wait_until(&self, timeout: Duration, check: impl Fn(&Self) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check(self) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl UpdateSink for RecordingSink {
    fn graph_update(&self, update: GraphUpdate) {
        self.graph.lock().push(update);
    }

    fn node_update(&self, update: NodeUpdate) {
        self.nodes.lock().push(update);
    }

    fn stream_failed(&self, error: &SyncError) {
        self.failures.lock().push(error.to_string());
    }
}

/// Accepts every edge; probes echo the runtime sample or return null
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl EdgeValidator for AcceptAll {
    async fn validate_edge(&self, _nodes: &NodeIndex, _check: &EdgeCheck) -> Result<(), EdgeFailure> {
        Ok(())
    }

    async fn simulate_port_data(&self, _nodes: &NodeIndex, probe: &PortProbe) -> Result<Value, EdgeFailure> {
        Ok(probe.runtime_sample.clone().unwrap_or(Value::Null))
    }
}

/// Rejects every edge and probe with a fixed message
#[derive(Debug, Clone)]
pub struct Rejecting(pub String);

#[async_trait]
impl EdgeValidator for Rejecting {
    async fn validate_edge(&self, _nodes: &NodeIndex, _check: &EdgeCheck) -> Result<(), EdgeFailure> {
        Err(EdgeFailure::Message(self.0.clone()))
    }

    async fn simulate_port_data(&self, _nodes: &NodeIndex, _probe: &PortProbe) -> Result<Value, EdgeFailure> {
        Err(EdgeFailure::Message(self.0.clone()))
    }
}

/// Answers after a fixed delay
#[derive(Debug, Clone, Copy)]
pub struct Slow(pub Duration);

#[async_trait]
impl EdgeValidator for Slow {
    async fn validate_edge(&self, _nodes: &NodeIndex, _check: &EdgeCheck) -> Result<(), EdgeFailure> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }

    async fn simulate_port_data(&self, _nodes: &NodeIndex, _probe: &PortProbe) -> Result<Value, EdgeFailure> {
        tokio::time::sleep(self.0).await;
        Ok(Value::Null)
    }
}

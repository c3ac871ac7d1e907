//! Single-object edits
//!
//! Every edit is a read-modify-write of one object. Concurrent writers are
//! last-write-wins; the session picks the outcome up from the watch stream
//! like any other change.

use crate::config::SyncConfig;
use crate::error::EditError;
use crate::topology::naming;
use flowsync_gateway::ObjectStore;
use flowsync_model::{ComponentRef, Edge, Graph, Node, PortConfig, PortRef, Position};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Result of a batch edit; failures do not stop the batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    /// Node name and error message
    pub failed: Vec<(String, String)>,
}

impl BatchOutcome {
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Node to add to a graph
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub project: String,
    pub graph: String,
    pub component: ComponentRef,
    pub position: Position,
    pub label: Option<String>,
}

impl NewNode {
    #[must_use]
    pub fn new(project: impl Into<String>, graph: impl Into<String>, component: ComponentRef) -> Self {
        Self {
            project: project.into(),
            graph: graph.into(),
            component,
            position: Position::default(),
            label: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

pub struct NodeEditor {
    store: Arc<dyn ObjectStore>,
    config: SyncConfig,
}

impl std::fmt::Debug for NodeEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeEditor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn require(value: &str, what: &str) -> Result<(), EditError> {
    if value.is_empty() {
        Err(EditError::invalid(format!("{what} is required")))
    } else {
        Ok(())
    }
}

fn require_port(port: &PortRef) -> Result<(), EditError> {
    require(&port.node, "node")?;
    require(&port.port, "port")
}

impl NodeEditor {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// Reads `name`, applies `edit` and writes the node back
    async fn modify<R>(&self, name: &str, edit: impl FnOnce(&mut Node) -> R + Send) -> Result<(Node, R), EditError> {
        require(name, "node name")?;
        let mut node = self.store.get_node(name).await?;
        let out = edit(&mut node);
        let stored = self
            .store
            .update_node_sync(node, self.config.write_timeout())
            .await?;
        Ok((stored, out))
    }

    /// Creates a node with a generated name and waits until it is readable
    pub async fn add_node(&self, request: NewNode) -> Result<Node, EditError> {
        require(&request.project, "project")?;
        require(&request.graph, "graph")?;
        require(&request.component.component, "component")?;

        let name = naming::new_node_name(
            &request.project,
            &request.graph,
            &request.component.module,
            &request.component.component,
        );
        let mut node = Node::new(name, request.project, request.graph, request.component);
        node.set_position(request.position);
        if let Some(label) = request.label {
            node.set_display_label(label);
        }
        let created = self
            .store
            .create_node_sync(node, self.config.write_timeout())
            .await?;
        tracing::info!(node = %created.name, graph = ?created.owning_graph(), "node added");
        Ok(created)
    }

    pub async fn delete_node(&self, name: &str) -> Result<(), EditError> {
        require(name, "node name")?;
        self.store.delete_node(name).await?;
        tracing::info!(node = %name, "node deleted");
        Ok(())
    }

    pub async fn move_node(&self, name: &str, position: Position) -> Result<Node, EditError> {
        let (node, ()) = self.modify(name, |n| n.set_position(position)).await?;
        Ok(node)
    }

    /// Moves several nodes; each one is written independently
    pub async fn move_nodes(&self, moves: &[(String, Position)]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (name, position) in moves {
            match self.move_node(name, *position).await {
                Ok(_) => outcome.succeeded += 1,
                Err(err) => {
                    tracing::warn!(node = %name, error = %err, "move failed");
                    outcome.failed.push((name.clone(), err.to_string()));
                }
            }
        }
        outcome
    }

    /// Sets the display label
    pub async fn rename_node(&self, name: &str, label: &str) -> Result<Node, EditError> {
        let (node, ()) = self.modify(name, |n| n.set_display_label(label)).await?;
        Ok(node)
    }

    pub async fn set_comment(&self, name: &str, comment: &str) -> Result<Node, EditError> {
        let (node, ()) = self.modify(name, |n| n.set_comment(comment)).await?;
        Ok(node)
    }

    /// Advances the rotation by a quarter turn and returns the new value
    pub async fn rotate_node(&self, name: &str) -> Result<u8, EditError> {
        let (_, rotation) = self
            .modify(name, |n| {
                let next = (n.rotation() + 1) % 4;
                n.set_rotation(next);
                next
            })
            .await?;
        Ok(rotation)
    }

    pub async fn set_dashboard(&self, name: &str, enabled: bool) -> Result<Node, EditError> {
        let (node, ()) = self.modify(name, |n| n.set_dashboard(enabled)).await?;
        Ok(node)
    }

    /// Replaces the handle-level configuration of `port`
    pub async fn configure_port(
        &self,
        port: &PortRef,
        configuration: Value,
        schema: Option<Value>,
    ) -> Result<Node, EditError> {
        require_port(port)?;
        let (node, ()) = self
            .modify(&port.node, |n| {
                let graph = n.owning_graph().unwrap_or_default().to_string();
                let mut config = PortConfig::handle(port.port.as_str())
                    .with_configuration(configuration)
                    .with_graph(graph);
                config.schema = schema;
                n.upsert_port_config(config);
            })
            .await?;
        Ok(node)
    }

    /// Adds an edge on the source node, plus an edge-level configuration on
    /// the target when one is given
    pub async fn connect(
        &self,
        source: &PortRef,
        target: &PortRef,
        configuration: Option<Value>,
    ) -> Result<Edge, EditError> {
        require_port(source)?;
        require_port(target)?;
        let id = Edge::derived_id(source, target);
        let (_, edge) = self
            .modify(&source.node, |n| {
                let graph = n.owning_graph().unwrap_or_default().to_string();
                let edge = Edge::new(id, source.port.as_str(), target, graph);
                n.upsert_edge(edge.clone());
                edge
            })
            .await?;
        if let Some(configuration) = configuration {
            self.configure_edge(source, target, configuration).await?;
        }
        tracing::info!(edge = %edge.id, "connected");
        Ok(edge)
    }

    /// Removes an edge and the target's configuration for it
    pub async fn disconnect(&self, source_node: &str, edge_id: &str) -> Result<Option<Edge>, EditError> {
        require(edge_id, "edge id")?;
        let (_, removed) = self.modify(source_node, |n| n.remove_edge(edge_id)).await?;
        let Some(edge) = removed else {
            return Ok(None);
        };
        let target = edge.target()?;
        let from = format!("{source_node}:{}", edge.port);
        match self
            .modify(&target.node, |n| {
                n.spec.ports.retain(|pc| pc.key() != (from.as_str(), target.port.as_str()));
            })
            .await
        {
            Ok(_) => {}
            Err(EditError::Store(err)) if err.is_not_found() => {
                tracing::debug!(node = %target.node, "edge target already gone");
            }
            Err(err) => return Err(err),
        }
        tracing::info!(edge = %edge.id, "disconnected");
        Ok(Some(edge))
    }

    /// Upserts the edge-level configuration stored on the target node
    pub async fn configure_edge(
        &self,
        source: &PortRef,
        target: &PortRef,
        configuration: Value,
    ) -> Result<Node, EditError> {
        require_port(source)?;
        require_port(target)?;
        let (node, ()) = self
            .modify(&target.node, |n| {
                let graph = n.owning_graph().unwrap_or_default().to_string();
                let mut config = PortConfig::edge(source, target.port.as_str())
                    .with_configuration(configuration)
                    .with_graph(graph);
                if let Some(existing) = n.edge_config(&source.to_string(), &target.port) {
                    config.schema.clone_from(&existing.schema);
                }
                n.upsert_port_config(config);
            })
            .await?;
        Ok(node)
    }

    pub async fn save_viewport(&self, graph: &str, x: f64, y: f64, zoom: f64) -> Result<Graph, EditError> {
        require(graph, "graph")?;
        let mut stored = self.store.get_graph(graph).await?;
        stored.set_viewport(x, y, zoom);
        Ok(self.store.update_graph(stored).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsync_gateway::MemoryStore;

    fn editor() -> (MemoryStore, NodeEditor) {
        let store = MemoryStore::new();
        let editor = NodeEditor::new(Arc::new(store.clone()), SyncConfig::default());
        (store, editor)
    }

    #[tokio::test]
    async fn rejects_empty_names_before_store_calls() {
        let (_, editor) = editor();
        assert!(matches!(editor.rotate_node("").await, Err(EditError::InvalidInput(_))));
        let bad = PortRef::new("a", "");
        assert!(matches!(
            editor.connect(&bad, &PortRef::new("b", "in"), None).await,
            Err(EditError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn rotation_cycles() {
        let (_, editor) = editor();
        let node = editor
            .add_node(NewNode::new("p", "g1", ComponentRef::new("common", "router")).at(1.0, 2.0))
            .await
            .unwrap();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(editor.rotate_node(&node.name).await.unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3, 0, 1]);
    }

    #[tokio::test]
    async fn batch_move_counts_failures() {
        let (_, editor) = editor();
        let node = editor
            .add_node(NewNode::new("p", "g1", ComponentRef::new("common", "router")))
            .await
            .unwrap();
        let to = Position { x: 5.0, y: 5.0 };
        let outcome = editor
            .move_nodes(&[(node.name.clone(), to), ("missing".to_string(), to)])
            .await;
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "missing");
    }
}

//! Moving nodes between graphs
//!
//! The store has no multi-object transactions, so the order of writes is
//! what keeps references intact:
//! 1. share every foreign neighbour into the destination
//! 2. create the renamed copies (edges already repointed between them)
//! 3. delete the originals
//! 4. repoint the neighbours that still reference the old names
//!
//! Between 2 and 4 readers may briefly see an edge to a vanished node; no
//! edge is left dangling once the transfer completes.

use crate::error::{TransferError, TransferStep};
use crate::topology::naming;
use flowsync_gateway::{NodeFilter, NodeStore};
use flowsync_model::{Node, PortRef};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub project: String,
    pub source_graph: String,
    pub dest_graph: String,
    pub nodes: Vec<String>,
}

impl TransferRequest {
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        source_graph: impl Into<String>,
        dest_graph: impl Into<String>,
        nodes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            project: project.into(),
            source_graph: source_graph.into(),
            dest_graph: dest_graph.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    fn validate(&self) -> Result<(), TransferError> {
        if self.nodes.is_empty() {
            return Err(TransferError::InvalidInput("no nodes to transfer".into()));
        }
        if self.source_graph.is_empty() {
            return Err(TransferError::InvalidInput("source graph is required".into()));
        }
        if self.dest_graph.is_empty() {
            return Err(TransferError::InvalidInput("destination graph is required".into()));
        }
        if self.project.is_empty() {
            return Err(TransferError::InvalidInput("project is required".into()));
        }
        Ok(())
    }
}

/// What a transfer did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    /// Old name to new name
    pub moved: BTreeMap<String, String>,
    /// Neighbours newly shared into the destination
    pub shared: Vec<String>,
    /// Neighbours whose references were repointed
    pub rewritten: Vec<String>,
    /// Requested ids not present in the project
    pub skipped: Vec<String>,
}

impl TransferOutcome {
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.moved.is_empty()
    }
}

/// Whether `node` is linked to any node in `moving`, in either direction
fn linked(node: &Node, moving: &BTreeSet<String>, index: &BTreeMap<String, Node>) -> bool {
    let references_moving = node.spec.edges.iter().any(|e| moving.contains(e.target_node()))
        || node.spec.ports.iter().any(|pc| {
            pc.from
                .as_deref()
                .and_then(|f| f.parse::<PortRef>().ok())
                .is_some_and(|r| moving.contains(&r.node))
        });
    references_moving
        || moving
            .iter()
            .filter_map(|m| index.get(m))
            .any(|m| m.references(&node.name))
}

/// Moves `request.nodes` from the source to the destination graph.
///
/// Ids that no longer exist are skipped, so repeating a completed transfer
/// is a no-op.
pub async fn transfer(
    store: &dyn NodeStore,
    request: &TransferRequest,
) -> Result<TransferOutcome, TransferError> {
    request.validate()?;
    let dest = request.dest_graph.as_str();
    let mut outcome = TransferOutcome::default();

    let index: BTreeMap<String, Node> = store
        .list_nodes(&NodeFilter::project(request.project.as_str()))
        .await?
        .into_iter()
        .map(|n| (n.name.clone(), n))
        .collect();

    let mut moving = BTreeSet::new();
    for id in &request.nodes {
        if index.contains_key(id) {
            moving.insert(id.clone());
        } else {
            tracing::warn!(node = %id, "transfer skips unknown node");
            outcome.skipped.push(id.clone());
        }
    }
    if moving.is_empty() {
        return Ok(outcome);
    }

    let neighbours: Vec<&Node> = index
        .values()
        .filter(|n| !moving.contains(&n.name) && linked(n, &moving, &index))
        .collect();

    // Sharing closure: foreign neighbours must stay visible from the destination
    for neighbour in neighbours.iter().filter(|n| !n.is_owned_by(dest)) {
        let mut fresh = store
            .get_node(&neighbour.name)
            .await
            .map_err(|e| TransferError::step(TransferStep::Sharing, &neighbour.name, e))?;
        if fresh.add_shared_graph(dest) {
            store
                .update_node(fresh)
                .await
                .map_err(|e| TransferError::step(TransferStep::Sharing, &neighbour.name, e))?;
            tracing::debug!(node = %neighbour.name, graph = %dest, "shared into destination");
            outcome.shared.push(neighbour.name.clone());
        }
    }

    let mut mapping: HashMap<String, String> = HashMap::new();
    let mut copies = Vec::with_capacity(moving.len());
    for id in &moving {
        let Some(original) = index.get(id) else { continue };
        let mut copy = original.clone();
        copy.strip_store_identity();
        copy.name = naming::transfer_name(&copy.spec.component.component);
        copy.set_owning_graph(dest);
        copy.clear_sharing();
        for edge in &mut copy.spec.edges {
            edge.graph_id = dest.to_string();
        }
        for pc in &mut copy.spec.ports {
            pc.graph_id = dest.to_string();
        }
        mapping.insert(id.clone(), copy.name.clone());
        copies.push(copy);
    }
    for copy in &mut copies {
        copy.rewrite_references(&mapping);
    }

    // Create before delete
    for copy in copies {
        let name = copy.name.clone();
        store
            .create_node(copy)
            .await
            .map_err(|e| TransferError::step(TransferStep::Creating, &name, e))?;
        tracing::info!(node = %name, graph = %dest, "created transferred copy");
    }
    for id in &moving {
        store
            .delete_node(id)
            .await
            .map_err(|e| TransferError::step(TransferStep::Deleting, id, e))?;
        if let Some(new_name) = mapping.get(id) {
            outcome.moved.insert(id.clone(), new_name.clone());
        }
    }

    for neighbour in neighbours {
        let mut fresh = match store.get_node(&neighbour.name).await {
            Ok(node) => node,
            Err(err) if err.is_not_found() => continue,
            Err(err) => return Err(TransferError::step(TransferStep::Rewriting, &neighbour.name, err)),
        };
        if fresh.rewrite_references(&mapping) {
            store
                .update_node(fresh)
                .await
                .map_err(|e| TransferError::step(TransferStep::Rewriting, &neighbour.name, e))?;
            outcome.rewritten.push(neighbour.name.clone());
        }
    }

    tracing::info!(
        moved = outcome.moved.len(),
        shared = outcome.shared.len(),
        rewritten = outcome.rewritten.len(),
        from = %request.source_graph,
        to = %dest,
        "transfer complete"
    );
    Ok(outcome)
}

//! Graph state cache
//!
//! Holds every node of the project (not only the focus graph's) so that
//! shared and foreign nodes can be resolved. The map sits behind one lock;
//! readers take an `Arc` snapshot and never observe a half-applied event.
//! Writers copy-on-write when a reader still holds the previous snapshot.

use flowsync_gateway::{EventKind, NodeIndex, WatchEvent};
use flowsync_model::Node;
use parking_lot::Mutex;
use std::sync::Arc;

/// What an applied event changed
#[derive(Debug, Clone, PartialEq)]
pub struct CacheChange {
    pub kind: EventKind,
    pub name: String,
    /// Snapshot held before the event, if the node was known
    pub previous: Option<Node>,
}

#[derive(Debug, Default)]
pub struct GraphStateCache {
    nodes: Mutex<Arc<NodeIndex>>,
}

impl GraphStateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let index: NodeIndex = nodes.into_iter().map(|n| (n.name.clone(), n)).collect();
        Self {
            nodes: Mutex::new(Arc::new(index)),
        }
    }

    /// Upserts on added/modified, removes on deleted.
    ///
    /// An added/modified event without a snapshot leaves the cache untouched.
    pub fn apply(&self, event: &WatchEvent) -> (Arc<NodeIndex>, CacheChange) {
        let mut guard = self.nodes.lock();
        let previous = match (event.kind, &event.node) {
            (EventKind::Deleted, _) => Arc::make_mut(&mut *guard).remove(&event.name),
            (_, Some(node)) => Arc::make_mut(&mut *guard).insert(event.name.clone(), node.clone()),
            (_, None) => guard.get(&event.name).cloned(),
        };
        let change = CacheChange {
            kind: event.kind,
            name: event.name.clone(),
            previous,
        };
        (Arc::clone(&*guard), change)
    }

    /// Replaces the whole content; returns (previous, current)
    pub fn replace_all(&self, nodes: impl IntoIterator<Item = Node>) -> (Arc<NodeIndex>, Arc<NodeIndex>) {
        let index: NodeIndex = nodes.into_iter().map(|n| (n.name.clone(), n)).collect();
        let current = Arc::new(index);
        let mut guard = self.nodes.lock();
        let previous = std::mem::replace(&mut *guard, Arc::clone(&current));
        (previous, current)
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<NodeIndex> {
        Arc::clone(&*self.nodes.lock())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Node> {
        self.nodes.lock().get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

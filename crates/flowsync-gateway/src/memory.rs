//! In-memory object store
//!
//! Behaves like the remote store as far as the core can observe:
//! - store-assigned identity and resource versions
//! - per-node ordered watch delivery, no replay of existing objects
//! - last-write-wins updates
//!
//! Faults can be injected to exercise partial-failure paths.

use crate::error::StoreError;
use crate::store::{
    GraphStore, NodeFilter, NodeStore, PageStore, ProjectStore, WatchEvent, WatchStream,
};
use async_trait::async_trait;
use dashmap::DashMap;
use flowsync_model::{Graph, Node, Page};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Injected failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Creating any node of this component fails
    CreateNode { component: String },
    /// Updating this node fails
    UpdateNode { name: String },
    /// Deleting this node fails
    DeleteNode { name: String },
    /// Creating a page with this title fails
    CreatePage { title: String },
    /// Saving the description of this project fails
    UpdateProjectDescription { project: String },
}

struct Watcher {
    id: u64,
    filter: NodeFilter,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct NodeState {
    nodes: BTreeMap<String, Node>,
    watchers: Vec<Watcher>,
}

impl NodeState {
    /// Fans out under the node lock so per-node order matches write order
    fn broadcast(&mut self, event: &WatchEvent, snapshot: &Node) {
        self.watchers.retain(|w| {
            if !w.filter.matches(snapshot) {
                return true;
            }
            w.tx.send(event.clone()).is_ok()
        });
    }
}

#[derive(Default)]
struct Inner {
    nodes: Mutex<NodeState>,
    graphs: DashMap<String, Graph>,
    pages: DashMap<String, Page>,
    descriptions: DashMap<String, String>,
    faults: Mutex<Vec<Fault>>,
    failing_watches: AtomicU32,
    sequence: AtomicU64,
}

impl Inner {
    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn has_fault(&self, fault: &Fault) -> bool {
        self.faults.lock().contains(fault)
    }

    fn remove_watcher(&self, id: u64) {
        self.nodes.lock().watchers.retain(|w| w.id != id);
    }
}

/// Shared handle to an in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.nodes.lock();
        f.debug_struct("MemoryStore")
            .field("nodes", &state.nodes.len())
            .field("watchers", &state.watchers.len())
            .field("graphs", &self.inner.graphs.len())
            .field("pages", &self.inner.pages.len())
            .finish()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: Fault) {
        self.inner.faults.lock().push(fault);
    }

    pub fn clear_faults(&self) {
        self.inner.faults.lock().clear();
        self.inner.failing_watches.store(0, Ordering::SeqCst);
    }

    /// The next `count` watch calls fail with `Unavailable`
    pub fn fail_next_watches(&self, count: u32) {
        self.inner.failing_watches.store(count, Ordering::SeqCst);
    }

    /// Closes every open watch channel as a store disconnect would
    pub fn close_watches(&self) {
        self.inner.nodes.lock().watchers.clear();
    }

    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let mut state = self.inner.nodes.lock();
        state.watchers.retain(|w| !w.tx.is_closed());
        state.watchers.len()
    }

    /// Current node contents, ordered by name
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.inner.nodes.lock().nodes.values().cloned().collect()
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<Node> {
        self.inner.nodes.lock().nodes.get(name).cloned()
    }

    /// Inserts or replaces a graph under its own resource name
    pub fn put_graph(&self, graph: Graph) {
        self.inner.graphs.insert(graph.name.clone(), graph);
    }

    /// Inserts or replaces a page under its own name
    pub fn put_page(&self, page: Page) {
        self.inner.pages.insert(page.name.clone(), page);
    }

    fn write_node(&self, mut node: Node, create: bool) -> Result<Node, StoreError> {
        let seq = self.inner.next_seq();
        let mut state = self.inner.nodes.lock();
        let existing = state.nodes.get(&node.name);
        match (create, existing) {
            (true, Some(_)) => {
                return Err(StoreError::AlreadyExists {
                    kind: "node",
                    name: node.name,
                })
            }
            (false, None) => return Err(StoreError::not_found("node", node.name)),
            (true, None) => node.meta.uid = Some(format!("uid-{seq}")),
            (false, Some(prev)) => node.meta.uid.clone_from(&prev.meta.uid),
        }
        node.meta.resource_version = Some(seq.to_string());
        let event = if create {
            WatchEvent::added(node.clone())
        } else {
            WatchEvent::modified(node.clone())
        };
        state.nodes.insert(node.name.clone(), node.clone());
        state.broadcast(&event, &node);
        Ok(node)
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get_node(&self, name: &str) -> Result<Node, StoreError> {
        self.node(name).ok_or_else(|| StoreError::not_found("node", name))
    }

    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StoreError> {
        Ok(self
            .inner
            .nodes
            .lock()
            .nodes
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }

    async fn create_node(&self, node: Node) -> Result<Node, StoreError> {
        let fault = Fault::CreateNode {
            component: node.spec.component.component.clone(),
        };
        if self.inner.has_fault(&fault) {
            return Err(StoreError::Backend(format!(
                "create rejected for component '{}'",
                node.spec.component.component
            )));
        }
        self.write_node(node, true)
    }

    async fn update_node(&self, node: Node) -> Result<Node, StoreError> {
        if self.inner.has_fault(&Fault::UpdateNode {
            name: node.name.clone(),
        }) {
            return Err(StoreError::Backend(format!("update rejected for '{}'", node.name)));
        }
        self.write_node(node, false)
    }

    async fn delete_node(&self, name: &str) -> Result<(), StoreError> {
        if self.inner.has_fault(&Fault::DeleteNode {
            name: name.to_string(),
        }) {
            return Err(StoreError::Backend(format!("delete rejected for '{name}'")));
        }
        let mut state = self.inner.nodes.lock();
        let removed = state
            .nodes
            .remove(name)
            .ok_or_else(|| StoreError::not_found("node", name))?;
        state.broadcast(&WatchEvent::deleted(name), &removed);
        Ok(())
    }

    async fn watch_nodes(&self, filter: &NodeFilter) -> Result<WatchStream, StoreError> {
        let failing = self
            .inner
            .failing_watches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Unavailable("watch refused".into()));
        }
        let id = self.inner.next_seq();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.nodes.lock().watchers.push(Watcher {
            id,
            filter: filter.clone(),
            tx,
        });
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(WatchStream::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_watcher(id);
            }
        }))
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn get_graph(&self, name: &str) -> Result<Graph, StoreError> {
        self.inner
            .graphs
            .get(name)
            .map(|g| g.value().clone())
            .ok_or_else(|| StoreError::not_found("graph", name))
    }

    async fn list_graphs(&self, project: &str) -> Result<Vec<Graph>, StoreError> {
        let mut graphs: Vec<Graph> = self
            .inner
            .graphs
            .iter()
            .filter(|g| g.project == project)
            .map(|g| g.value().clone())
            .collect();
        graphs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(graphs)
    }

    async fn create_graph(&self, project: &str, display_name: &str) -> Result<Graph, StoreError> {
        let name = format!("{project}-graph-{}", self.inner.next_seq());
        let graph = Graph::new(name.clone(), project, display_name);
        self.inner.graphs.insert(name, graph.clone());
        Ok(graph)
    }

    async fn update_graph(&self, graph: Graph) -> Result<Graph, StoreError> {
        match self.inner.graphs.get_mut(&graph.name) {
            Some(mut slot) => {
                *slot = graph.clone();
                Ok(graph)
            }
            None => Err(StoreError::not_found("graph", graph.name)),
        }
    }
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn list_pages(&self, project: &str) -> Result<Vec<Page>, StoreError> {
        let mut pages: Vec<Page> = self
            .inner
            .pages
            .iter()
            .filter(|p| p.project == project)
            .map(|p| p.value().clone())
            .collect();
        pages.sort_by(|a, b| a.sort_index.cmp(&b.sort_index).then_with(|| a.name.cmp(&b.name)));
        Ok(pages)
    }

    async fn create_page(&self, mut page: Page) -> Result<Page, StoreError> {
        if self.inner.has_fault(&Fault::CreatePage {
            title: page.title.clone(),
        }) {
            return Err(StoreError::Backend(format!("page '{}' rejected", page.title)));
        }
        if page.name.is_empty() {
            page.name = format!("{}-page-{}", page.project, self.inner.next_seq());
        }
        if self.inner.pages.contains_key(&page.name) {
            return Err(StoreError::AlreadyExists {
                kind: "page",
                name: page.name,
            });
        }
        self.inner.pages.insert(page.name.clone(), page.clone());
        Ok(page)
    }

    async fn update_page(&self, page: Page) -> Result<Page, StoreError> {
        match self.inner.pages.get_mut(&page.name) {
            Some(mut slot) => {
                *slot = page.clone();
                Ok(page)
            }
            None => Err(StoreError::not_found("page", page.name)),
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn get_project_description(&self, project: &str) -> Result<String, StoreError> {
        Ok(self
            .inner
            .descriptions
            .get(project)
            .map(|d| d.value().clone())
            .unwrap_or_default())
    }

    async fn update_project_description(&self, project: &str, description: &str) -> Result<(), StoreError> {
        if self.inner.has_fault(&Fault::UpdateProjectDescription {
            project: project.to_string(),
        }) {
            return Err(StoreError::Backend(format!("project '{project}' rejected")));
        }
        self.inner
            .descriptions
            .insert(project.to_string(), description.to_string());
        Ok(())
    }
}

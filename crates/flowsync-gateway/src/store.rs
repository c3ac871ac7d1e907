//! Object store contracts
//!
//! The store is the long-lived owner of every resource. It offers typed
//! CRUD per resource kind and an at-least-once watch stream for nodes; it
//! offers no multi-object transactions.

use crate::error::StoreError;
use async_trait::async_trait;
use flowsync_model::{Graph, Node, Page};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Interval between readiness probes in `create_node_sync`
const READY_POLL: Duration = Duration::from_millis(50);

/// Selection criteria for node list and watch calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub project: Option<String>,
    pub graph: Option<String>,
    pub dashboard_only: bool,
}

impl NodeFilter {
    /// All nodes of a project
    #[must_use]
    pub fn project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn dashboard_only(mut self) -> Self {
        self.dashboard_only = true;
        self
    }

    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(project) = &self.project {
            if node.project() != Some(project.as_str()) {
                return false;
            }
        }
        if let Some(graph) = &self.graph {
            if !node.is_owned_by(graph) {
                return false;
            }
        }
        !self.dashboard_only || node.is_dashboard()
    }
}

/// Change operation carried by a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

/// One change notification; deletions carry no snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub name: String,
    pub node: Option<Node>,
}

impl WatchEvent {
    #[must_use]
    pub fn added(node: Node) -> Self {
        Self {
            kind: EventKind::Added,
            name: node.name.clone(),
            node: Some(node),
        }
    }

    #[must_use]
    pub fn modified(node: Node) -> Self {
        Self {
            kind: EventKind::Modified,
            name: node.name.clone(),
            node: Some(node),
        }
    }

    #[must_use]
    pub fn deleted(name: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Deleted,
            name: name.into(),
            node: None,
        }
    }
}

type StopFn = Box<dyn FnOnce() + Send>;

/// Open watch subscription
///
/// `recv` yields `None` once the store closes the channel. Dropping the
/// stream stops the subscription.
pub struct WatchStream {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
    stop: Option<StopFn>,
}

impl WatchStream {
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<WatchEvent>, stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            stop: Some(Box::new(stop)),
        }
    }

    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Releases the subscription; safe to call more than once
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
        self.rx.close();
    }

    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stop.is_none()
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchStream")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

fn timeout_error(timeout: Duration) -> StoreError {
    StoreError::Timeout {
        millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Node resource access
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get_node(&self, name: &str) -> Result<Node, StoreError>;

    async fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<Node>, StoreError>;

    /// Creates `node`; the returned copy carries store-assigned identity
    async fn create_node(&self, node: Node) -> Result<Node, StoreError>;

    /// Replaces the stored node (last write wins)
    async fn update_node(&self, node: Node) -> Result<Node, StoreError>;

    async fn delete_node(&self, name: &str) -> Result<(), StoreError>;

    async fn watch_nodes(&self, filter: &NodeFilter) -> Result<WatchStream, StoreError>;

    /// Creates `node` and waits until it can be read back, bounded by `timeout`
    async fn create_node_sync(&self, node: Node, timeout: Duration) -> Result<Node, StoreError> {
        let wait = async {
            let created = self.create_node(node).await?;
            loop {
                match self.get_node(&created.name).await {
                    Ok(ready) => return Ok(ready),
                    Err(err) if err.is_not_found() => tokio::time::sleep(READY_POLL).await,
                    Err(err) => return Err(err),
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| timeout_error(timeout))?
    }

    async fn update_node_sync(&self, node: Node, timeout: Duration) -> Result<Node, StoreError> {
        tokio::time::timeout(timeout, self.update_node(node))
            .await
            .map_err(|_| timeout_error(timeout))?
    }
}

/// Graph resource access
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get_graph(&self, name: &str) -> Result<Graph, StoreError>;

    async fn list_graphs(&self, project: &str) -> Result<Vec<Graph>, StoreError>;

    /// Creates a graph; the store picks the resource name
    async fn create_graph(&self, project: &str, display_name: &str) -> Result<Graph, StoreError>;

    async fn update_graph(&self, graph: Graph) -> Result<Graph, StoreError>;
}

/// Dashboard page access
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Pages of a project ordered by sort index
    async fn list_pages(&self, project: &str) -> Result<Vec<Page>, StoreError>;

    /// Creates a page; an empty name is generated by the store
    async fn create_page(&self, page: Page) -> Result<Page, StoreError>;

    async fn update_page(&self, page: Page) -> Result<Page, StoreError>;
}

/// Project-level metadata
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Description of `project`; empty when none was saved
    async fn get_project_description(&self, project: &str) -> Result<String, StoreError>;

    async fn update_project_description(&self, project: &str, description: &str) -> Result<(), StoreError>;
}

/// Everything the core consumes from the store
pub trait ObjectStore: NodeStore + GraphStore + PageStore + ProjectStore {}

impl<T: NodeStore + GraphStore + PageStore + ProjectStore + ?Sized> ObjectStore for T {}

//! Dashboard widgets
//!
//! A dashboard-flagged node exposes its control port as a widget. Pages
//! place widgets on a grid; a widget placed on no page at all shows up on
//! the default page (lowest sort index) only, laid out two per row.

use crate::cache::GraphStateCache;
use crate::config::SyncConfig;
use crate::consumer::{shutdown_channel, ChangeStreamConsumer, ConsumerEvent, ShutdownSignal, WatchTasks};
use crate::emitter::{NodeUpdate, UpdateSink};
use crate::error::SyncError;
use flowsync_gateway::{EventKind, NodeFilter, ObjectStore};
use flowsync_model::keys::CONTROL_PORT;
use flowsync_model::page::{DEFAULT_WIDGET_HEIGHT, DEFAULT_WIDGET_WIDTH};
use flowsync_model::{Node, Page, PortRef, Widget};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Widget for a dashboard node, if it exposes a control port
#[must_use]
pub fn widget_from_node(node: &Node) -> Option<Widget> {
    if !node.is_dashboard() {
        return None;
    }
    let status = node.port_status(CONTROL_PORT);
    let handle = node.handle_config(CONTROL_PORT);
    if status.is_none() && handle.is_none() {
        return None;
    }
    Some(Widget {
        port: PortRef::new(node.name.as_str(), CONTROL_PORT),
        title: node
            .display_label()
            .unwrap_or(node.spec.component.component.as_str())
            .to_string(),
        schema: status
            .and_then(|s| s.schema.clone())
            .or_else(|| handle.and_then(|h| h.schema.clone())),
        configuration: handle
            .and_then(|h| h.configuration.clone())
            .or_else(|| status.and_then(|s| s.configuration.clone())),
        grid_x: 0,
        grid_y: 0,
        grid_w: DEFAULT_WIDGET_WIDTH,
        grid_h: DEFAULT_WIDGET_HEIGHT,
        schema_patch: None,
    })
}

/// Page with the lowest sort index; ties go to the first listed
#[must_use]
pub fn default_page(pages: &[Page]) -> Option<&Page> {
    pages.iter().reduce(|best, p| if p.sort_index < best.sort_index { p } else { best })
}

/// Widgets shown on `page`, in node name order
///
/// Placed widgets keep their stored grid; unplaced ones appear only on the
/// default page at x = (i % 2) * 3, y = (i / 2) * 4.
#[must_use]
pub fn widgets_for_page<'a>(nodes: impl IntoIterator<Item = &'a Node>, pages: &[Page], page: &str) -> Vec<Widget> {
    let Some(current) = pages.iter().find(|p| p.name == page) else {
        return Vec::new();
    };
    let is_default = default_page(pages).is_some_and(|d| d.name == current.name);

    let mut widgets: Vec<Widget> = nodes.into_iter().filter_map(widget_from_node).collect();
    widgets.sort_by(|a, b| a.port.node.cmp(&b.port.node));

    let mut shown = Vec::new();
    let mut unplaced: u32 = 0;
    for widget in widgets {
        if let Some(placement) = current.placement(&widget.port) {
            shown.push(widget.placed(placement));
        } else if is_default && pages.iter().all(|p| p.placement(&widget.port).is_none()) {
            let mut widget = widget;
            widget.grid_x = (unplaced % 2) * DEFAULT_WIDGET_WIDTH;
            widget.grid_y = (unplaced / 2) * DEFAULT_WIDGET_HEIGHT;
            unplaced += 1;
            shown.push(widget);
        }
    }
    shown
}

/// Dashboard watch for one project
///
/// Emits `NodeUpdate`s for nodes that are, or just stopped being,
/// dashboard nodes. Same lifecycle rules as a graph session, without a
/// heartbeat.
pub struct DashboardSession {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn UpdateSink>,
    config: SyncConfig,
    active: Mutex<Option<(String, WatchTasks)>>,
}

impl std::fmt::Debug for DashboardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DashboardSession {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, sink: Arc<dyn UpdateSink>, config: SyncConfig) -> Self {
        Self {
            store,
            sink,
            config,
            active: Mutex::new(None),
        }
    }

    /// Starts watching `project`, replacing any previous watch
    pub async fn start(&self, project: &str) -> Result<(), SyncError> {
        if project.is_empty() {
            return Err(SyncError::invalid("project is required"));
        }
        let mut active = self.active.lock().await;
        if let Some((_, previous)) = active.take() {
            previous.shutdown().await;
        }

        let filter = NodeFilter::project(project);
        let stream = self.store.watch_nodes(&filter).await?;
        let nodes = self.store.list_nodes(&filter).await?;
        let cache = Arc::new(GraphStateCache::from_nodes(nodes));

        let (trigger, signal) = shutdown_channel();
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        let mut tasks = WatchTasks::new(trigger);
        let consumer = ChangeStreamConsumer::new(Arc::clone(&self.store), filter, cache, &self.config)
            .without_heartbeat();
        tasks.push(consumer.spawn(stream, tx, signal.clone()));
        tasks.push(tokio::spawn(dispatch(rx, Arc::clone(&self.sink), signal)));

        tracing::info!(project, "dashboard watch started");
        *active = Some((project.to_string(), tasks));
        Ok(())
    }

    /// Idempotent
    pub async fn stop(&self) {
        let previous = self.active.lock().await.take();
        if let Some((project, tasks)) = previous {
            tasks.shutdown().await;
            tracing::info!(project = %project, "dashboard watch stopped");
        }
    }

    /// Widgets of `page` as currently stored
    pub async fn widgets(&self, project: &str, page: &str) -> Result<Vec<Widget>, SyncError> {
        let nodes = self
            .store
            .list_nodes(&NodeFilter::project(project).dashboard_only())
            .await?;
        let pages = self.store.list_pages(project).await?;
        Ok(widgets_for_page(&nodes, &pages, page))
    }
}

fn node_update(kind: EventKind, name: &str, previous: Option<&Node>, current: Option<&Node>) -> Option<NodeUpdate> {
    let was = previous.is_some_and(Node::is_dashboard);
    let is = current.is_some_and(Node::is_dashboard);
    if !was && !is {
        return None;
    }
    let (event_type, widget) = match (kind, current) {
        (EventKind::Deleted, _) | (_, None) => (EventKind::Deleted, None),
        (_, Some(_)) if !is => (EventKind::Deleted, None),
        (kind, Some(node)) => (kind, widget_from_node(node)),
    };
    Some(NodeUpdate {
        event_type,
        node_name: name.to_string(),
        widget,
    })
}

async fn dispatch(mut rx: mpsc::Receiver<ConsumerEvent>, sink: Arc<dyn UpdateSink>, mut shutdown: ShutdownSignal) {
    loop {
        let event = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match event {
            ConsumerEvent::Change { snapshot, change } => {
                let current = snapshot.get(&change.name);
                if let Some(update) = node_update(change.kind, &change.name, change.previous.as_ref(), current) {
                    sink.node_update(update);
                }
            }
            ConsumerEvent::Resync { previous, snapshot } => {
                for (name, node) in previous.iter() {
                    if !snapshot.contains_key(name) {
                        if let Some(update) = node_update(EventKind::Deleted, name, Some(node), None) {
                            sink.node_update(update);
                        }
                    }
                }
                for (name, node) in snapshot.iter() {
                    if let Some(update) = node_update(EventKind::Modified, name, previous.get(name), Some(node)) {
                        sink.node_update(update);
                    }
                }
            }
            ConsumerEvent::Failed(err) => sink.stream_failed(&err),
            ConsumerEvent::Heartbeat | ConsumerEvent::Stats(_) => {}
        }
    }
}

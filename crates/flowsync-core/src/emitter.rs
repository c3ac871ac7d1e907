//! Update emitter
//!
//! Turns cache changes into presentation events. For one change the edge
//! events of the node always come first, immediately followed by the node
//! event. Deletions never carry a record.

use crate::builder::{BuildOptions, GraphBuilder};
use crate::cache::CacheChange;
use crate::error::SyncError;
use crate::visibility::Visibility;
use flowsync_gateway::{EventKind, NodeIndex, StatSample};
use flowsync_model::{GraphElement, Widget};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-element metric values keyed by element id, then metric name
pub type StatsBatch = BTreeMap<String, BTreeMap<String, f64>>;

/// Event delivered to the graph editor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphUpdate {
    Added { id: String, record: GraphElement },
    Modified { id: String, record: GraphElement },
    Deleted { id: String },
    Tick,
    Stats { batch: StatsBatch },
}

impl GraphUpdate {
    fn upsert(kind: EventKind, record: GraphElement) -> Self {
        let id = record.id().to_string();
        match kind {
            EventKind::Added => Self::Added { id, record },
            _ => Self::Modified { id, record },
        }
    }

    /// Element id, if the event concerns one
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Added { id, .. } | Self::Modified { id, .. } | Self::Deleted { id } => Some(id),
            Self::Tick | Self::Stats { .. } => None,
        }
    }

    #[must_use]
    pub fn record(&self) -> Option<&GraphElement> {
        match self {
            Self::Added { record, .. } | Self::Modified { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Event delivered to the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub event_type: EventKind,
    pub node_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget: Option<Widget>,
}

/// Presentation layer
pub trait UpdateSink: Send + Sync {
    fn graph_update(&self, update: GraphUpdate);

    fn node_update(&self, update: NodeUpdate) {
        let _ = update;
    }

    /// The watch could not be re-established; the caller must restart
    fn stream_failed(&self, error: &SyncError) {
        tracing::error!(error = %error, "change stream failed");
    }
}

/// Graph session emitter for one focus graph
pub struct UpdateEmitter {
    builder: GraphBuilder,
    focus: String,
    options: BuildOptions,
    metric_prefix: String,
    sink: Arc<dyn UpdateSink>,
}

impl std::fmt::Debug for UpdateEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateEmitter")
            .field("focus", &self.focus)
            .field("metric_prefix", &self.metric_prefix)
            .finish_non_exhaustive()
    }
}

impl UpdateEmitter {
    #[must_use]
    pub fn new(
        builder: GraphBuilder,
        focus: impl Into<String>,
        options: BuildOptions,
        metric_prefix: impl Into<String>,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            builder,
            focus: focus.into(),
            options,
            metric_prefix: metric_prefix.into(),
            sink,
        }
    }

    fn rendered(&self, node: &flowsync_model::Node) -> bool {
        Visibility::of(node, &self.focus).rendered(self.options.scope)
    }

    /// Emits the events for one applied change; returns how many were sent
    pub async fn on_change(&self, snapshot: &NodeIndex, change: &CacheChange) -> usize {
        let was_rendered = change.previous.as_ref().map(|n| self.rendered(n));
        let current = match change.kind {
            EventKind::Deleted => None,
            _ => snapshot.get(&change.name),
        };

        let Some(node) = current else {
            // Unknown nodes still produce a deletion: removing an unknown id
            // is a no-op downstream.
            if change.kind == EventKind::Deleted && was_rendered != Some(false) {
                self.sink.graph_update(GraphUpdate::Deleted {
                    id: change.name.clone(),
                });
                return 1;
            }
            return 0;
        };

        match self
            .builder
            .node_elements(snapshot, node, &self.focus, &self.options)
            .await
        {
            Some(elements) => {
                let count = elements.edges.len() + 1;
                for edge in elements.edges {
                    self.sink.graph_update(GraphUpdate::upsert(change.kind, edge));
                }
                self.sink.graph_update(GraphUpdate::upsert(
                    change.kind,
                    GraphElement::Node(elements.node),
                ));
                count
            }
            None if was_rendered == Some(true) => {
                tracing::debug!(node = %node.name, graph = %self.focus, "node left the focus graph");
                self.sink.graph_update(GraphUpdate::Deleted {
                    id: node.name.clone(),
                });
                1
            }
            None => 0,
        }
    }

    /// Reconciles after a relist: vanished nodes are deleted, listed nodes
    /// are re-sent as modifications.
    pub async fn on_resync(&self, previous: &NodeIndex, current: &NodeIndex) -> usize {
        let mut sent = 0;
        for (name, node) in previous {
            if !current.contains_key(name) {
                let change = CacheChange {
                    kind: EventKind::Deleted,
                    name: name.clone(),
                    previous: Some(node.clone()),
                };
                sent += self.on_change(current, &change).await;
            }
        }
        for name in current.keys() {
            let change = CacheChange {
                kind: EventKind::Modified,
                name: name.clone(),
                previous: previous.get(name).cloned(),
            };
            sent += self.on_change(current, &change).await;
        }
        sent
    }

    pub fn on_tick(&self) {
        self.sink.graph_update(GraphUpdate::Tick);
    }

    /// Emits prefixed per-element metrics as one batch; returns false when
    /// nothing qualified.
    pub fn on_stats(&self, samples: &[StatSample]) -> bool {
        let batch = group_stats(samples, &self.metric_prefix);
        if batch.is_empty() {
            return false;
        }
        self.sink.graph_update(GraphUpdate::Stats { batch });
        true
    }

    pub fn on_failure(&self, error: &SyncError) {
        self.sink.stream_failed(error);
    }
}

/// Groups samples by element, keeping prefixed metrics of non-empty elements
#[must_use]
pub fn group_stats(samples: &[StatSample], prefix: &str) -> StatsBatch {
    let mut batch = StatsBatch::new();
    for sample in samples
        .iter()
        .filter(|s| !s.element.is_empty() && s.metric.starts_with(prefix))
    {
        batch
            .entry(sample.element.clone())
            .or_default()
            .insert(sample.metric.clone(), sample.value);
    }
    batch
}

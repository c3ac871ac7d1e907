//! Metrics subscription contract

use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Capacity of each subscriber's batch channel
const SUBSCRIBER_CAPACITY: usize = 64;

/// One metric value for one graph element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSample {
    /// Element id (node or edge); may be empty for graph-wide metrics
    pub element: String,
    pub metric: String,
    pub value: f64,
}

impl StatSample {
    #[must_use]
    pub fn new(element: impl Into<String>, metric: impl Into<String>, value: f64) -> Self {
        Self {
            element: element.into(),
            metric: metric.into(),
            value,
        }
    }
}

/// Metrics collaborator
///
/// Dropping the returned receiver unsubscribes.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Subscribes to `metrics` of a graph; an empty list means every metric
    async fn subscribe_stats(
        &self,
        project: &str,
        graph: &str,
        metrics: &[String],
    ) -> Result<mpsc::Receiver<Vec<StatSample>>, StoreError>;
}

struct Subscriber {
    project: String,
    graph: String,
    metrics: Vec<String>,
    tx: mpsc::Sender<Vec<StatSample>>,
}

/// In-process fan-out of published sample batches
#[derive(Default)]
pub struct StatsHub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl StatsHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `batch` to every live subscriber of (project, graph);
    /// returns how many received it. Full subscribers miss the batch.
    pub fn publish(&self, project: &str, graph: &str, batch: &[StatSample]) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for sub in subscribers
            .iter()
            .filter(|s| s.project == project && s.graph == graph)
        {
            let selected: Vec<StatSample> = batch
                .iter()
                .filter(|s| sub.metrics.is_empty() || sub.metrics.contains(&s.metric))
                .cloned()
                .collect();
            if selected.is_empty() {
                continue;
            }
            match sub.tx.try_send(selected) {
                Ok(()) => delivered += 1,
                Err(err) => tracing::debug!(graph, error = %err, "stats batch dropped"),
            }
        }
        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }
}

#[async_trait]
impl StatsSource for StatsHub {
    async fn subscribe_stats(
        &self,
        project: &str,
        graph: &str,
        metrics: &[String],
    ) -> Result<mpsc::Receiver<Vec<StatSample>>, StoreError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.lock().push(Subscriber {
            project: project.to_string(),
            graph: graph.to_string(),
            metrics: metrics.to_vec(),
            tx,
        });
        Ok(rx)
    }
}

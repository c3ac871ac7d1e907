//! Graph editing session
//!
//! A `GraphSession` owns at most one live watch. Starting a new scope first
//! tears the previous one down completely (consumer, heartbeat, stats and
//! dispatcher tasks) so two tasks never write to the same cache.
//!
//! Task layout per active scope:
//! - change stream consumer (also drives the heartbeat)
//! - optional stats subscription
//! - dispatcher, the only task that talks to the sink

use crate::builder::{BuildOptions, GraphBuilder};
use crate::cache::GraphStateCache;
use crate::config::SyncConfig;
use crate::consumer::{shutdown_channel, ChangeStreamConsumer, ConsumerEvent, ShutdownSignal, WatchTasks};
use crate::emitter::{UpdateEmitter, UpdateSink};
use crate::error::SyncError;
use crate::visibility::BuildScope;
use flowsync_gateway::{
    EdgeValidator, NodeFilter, ObjectStore, PortProbe, StatSample, StatsSource,
};
use flowsync_model::{Graph, GraphElement, PortRef, Viewport};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// What a session watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScope {
    pub project: String,
    pub graph: String,
    pub build_scope: BuildScope,
}

impl SessionScope {
    #[must_use]
    pub fn new(project: impl Into<String>, graph: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            graph: graph.into(),
            build_scope: BuildScope::Focus,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_build_scope(mut self, scope: BuildScope) -> Self {
        self.build_scope = scope;
        self
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.project.is_empty() {
            return Err(SyncError::invalid("project is required"));
        }
        if self.graph.is_empty() {
            return Err(SyncError::invalid("graph is required"));
        }
        Ok(())
    }
}

/// Initial editor payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorGraph {
    pub project: String,
    pub graph: Graph,
    pub viewport: Viewport,
    pub elements: Vec<GraphElement>,
}

/// Where inspected port data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Simulated,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInspection {
    pub port: PortRef,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_error: Option<String>,
    pub data_source: DataSource,
}

struct ActiveWatch {
    scope: SessionScope,
    cache: Arc<GraphStateCache>,
    tasks: WatchTasks,
}

pub struct GraphSession {
    store: Arc<dyn ObjectStore>,
    validator: Arc<dyn EdgeValidator>,
    stats: Option<Arc<dyn StatsSource>>,
    sink: Arc<dyn UpdateSink>,
    config: SyncConfig,
    active: Mutex<Option<ActiveWatch>>,
}

impl std::fmt::Debug for GraphSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSession")
            .field("config", &self.config)
            .field("stats", &self.stats.is_some())
            .finish_non_exhaustive()
    }
}

impl GraphSession {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        validator: Arc<dyn EdgeValidator>,
        sink: Arc<dyn UpdateSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            validator,
            stats: None,
            sink,
            config,
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_stats(mut self, stats: Arc<dyn StatsSource>) -> Self {
        self.stats = Some(stats);
        self
    }

    fn builder(&self) -> GraphBuilder {
        GraphBuilder::new(Arc::clone(&self.validator), self.config.validation_timeout())
    }

    /// Replaces any running watch with one for `scope` and returns the
    /// initial graph.
    pub async fn start(&self, scope: SessionScope) -> Result<EditorGraph, SyncError> {
        scope.validate()?;
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            tracing::info!(graph = %previous.scope.graph, "replacing active watch");
            previous.tasks.shutdown().await;
        }

        let graph = self.store.get_graph(&scope.graph).await?;
        let filter = NodeFilter::project(scope.project.as_str());
        // Subscribe before listing so nothing between the two is lost
        let stream = self.store.watch_nodes(&filter).await?;
        let nodes = self.store.list_nodes(&filter).await?;
        let cache = Arc::new(GraphStateCache::from_nodes(nodes));

        let builder = self.builder();
        let options = BuildOptions::default().with_scope(scope.build_scope);
        let built = builder.build(&cache.snapshot(), &scope.graph, &options).await;

        let (trigger, signal) = shutdown_channel();
        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        let mut tasks = WatchTasks::new(trigger);

        let consumer = ChangeStreamConsumer::new(
            Arc::clone(&self.store),
            filter,
            Arc::clone(&cache),
            &self.config,
        );
        tasks.push(consumer.spawn(stream, tx.clone(), signal.clone()));

        if let Some(stats) = &self.stats {
            match stats.subscribe_stats(&scope.project, &scope.graph, &[]).await {
                Ok(samples) => tasks.push(tokio::spawn(forward_stats(samples, tx, signal.clone()))),
                Err(err) => tracing::warn!(error = %err, "stats unavailable for this session"),
            }
        }

        let emitter = UpdateEmitter::new(
            builder,
            scope.graph.as_str(),
            options,
            self.config.edge_metric_prefix.as_str(),
            Arc::clone(&self.sink),
        );
        tasks.push(tokio::spawn(dispatch(rx, emitter, signal)));

        tracing::info!(project = %scope.project, graph = %scope.graph, nodes = cache.len(), "session started");
        let editor = EditorGraph {
            project: scope.project.clone(),
            viewport: graph.viewport(),
            graph,
            elements: built.into_elements(),
        };
        *active = Some(ActiveWatch { scope, cache, tasks });
        Ok(editor)
    }

    /// Tears down the running watch; a no-op when none is running
    pub async fn stop(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            previous.tasks.shutdown().await;
            tracing::info!(graph = %previous.scope.graph, "session stopped");
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn scope(&self) -> Option<SessionScope> {
        self.active.lock().await.as_ref().map(|a| a.scope.clone())
    }

    async fn current(&self) -> Result<(SessionScope, Arc<GraphStateCache>), SyncError> {
        let active = self.active.lock().await;
        let watch = active.as_ref().ok_or(SyncError::NotStarted)?;
        Ok((watch.scope.clone(), Arc::clone(&watch.cache)))
    }

    /// Describes a port from the live cache and asks the validator for
    /// sample data; a failed or slow probe is reported in `data_error`.
    pub async fn inspect_port(
        &self,
        port: &PortRef,
        runtime_sample: Option<Value>,
    ) -> Result<PortInspection, SyncError> {
        let (_, cache) = self.current().await?;
        let snapshot = cache.snapshot();
        let node = snapshot
            .get(&port.node)
            .ok_or_else(|| SyncError::UnknownNode(port.node.clone()))?;

        let status = node.port_status(&port.port);
        let handle = node.handle_config(&port.port);
        let data_source = if runtime_sample.is_some() {
            DataSource::Runtime
        } else {
            DataSource::Simulated
        };
        let probe = PortProbe {
            port: port.clone(),
            runtime_sample,
        };
        let timeout = self.config.inspect_timeout();
        let (data, data_error) =
            match tokio::time::timeout(timeout, self.validator.simulate_port_data(&snapshot, &probe)).await {
                Ok(Ok(data)) => (Some(data), None),
                Ok(Err(failure)) => (None, Some(failure.summary())),
                Err(_) => (None, Some(format!("port data timed out after {}ms", timeout.as_millis()))),
            };

        Ok(PortInspection {
            port: port.clone(),
            label: status
                .map(|s| s.label.clone())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| port.port.clone()),
            schema: handle
                .and_then(|pc| pc.schema.clone())
                .or_else(|| status.and_then(|s| s.schema.clone())),
            configuration: handle
                .and_then(|pc| pc.configuration.clone())
                .or_else(|| status.and_then(|s| s.configuration.clone())),
            data,
            data_error,
            data_source,
        })
    }

    /// Rebuilds the focus graph from the live cache, e.g. with a trace's
    /// runtime samples overlaid.
    pub async fn snapshot(&self, options: BuildOptions) -> Result<Vec<GraphElement>, SyncError> {
        let (scope, cache) = self.current().await?;
        let options = BuildOptions {
            scope: scope.build_scope,
            ..options
        };
        Ok(self
            .builder()
            .build(&cache.snapshot(), &scope.graph, &options)
            .await
            .into_elements())
    }
}

async fn forward_stats(
    mut samples: mpsc::Receiver<Vec<StatSample>>,
    tx: mpsc::Sender<ConsumerEvent>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            batch = samples.recv() => match batch {
                Some(batch) => {
                    if tx.send(ConsumerEvent::Stats(batch)).await.is_err() {
                        break;
                    }
                }
                None => {
                    tracing::debug!("stats subscription ended");
                    break;
                }
            }
        }
    }
}

async fn dispatch(mut rx: mpsc::Receiver<ConsumerEvent>, emitter: UpdateEmitter, mut shutdown: ShutdownSignal) {
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
                emitter.on_change(&snapshot, &change).await;
            }
            ConsumerEvent::Heartbeat => emitter.on_tick(),
            ConsumerEvent::Stats(samples) => {
                emitter.on_stats(&samples);
            }
            ConsumerEvent::Resync { previous, snapshot } => {
                emitter.on_resync(&previous, &snapshot).await;
            }
            ConsumerEvent::Failed(err) => emitter.on_failure(&err),
        }
    }
}

//! Change stream consumer
//!
//! One task per watch scope. It waits on three things at once: the shutdown
//! signal, the heartbeat timer and the watch stream. Each received event is
//! applied to the cache here, then forwarded with the resulting snapshot to
//! the session's dispatcher over an ordered channel.
//!
//! When the store closes the stream, the consumer waits a fixed backoff
//! (cut short by shutdown), re-subscribes and relists. The heartbeat keeps
//! ticking through the backoff; it pauses only for the re-subscribe and
//! relist calls. A failed re-subscription is reported once and ends the
//! task.

use crate::cache::{CacheChange, GraphStateCache};
use crate::config::SyncConfig;
use crate::error::SyncError;
use flowsync_gateway::{NodeFilter, NodeIndex, ObjectStore, StatSample, WatchStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Message from the session's background tasks to its dispatcher
#[derive(Debug)]
pub enum ConsumerEvent {
    Change {
        snapshot: Arc<NodeIndex>,
        change: CacheChange,
    },
    Heartbeat,
    Stats(Vec<StatSample>),
    /// Cache was replaced after a reconnect
    Resync {
        previous: Arc<NodeIndex>,
        snapshot: Arc<NodeIndex>,
    },
    Failed(SyncError),
}

/// Fires shutdown for every task holding a matching signal
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

#[must_use]
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.0.send_replace(true);
    }
}

impl ShutdownSignal {
    /// Resolves once fired, or once the trigger is gone
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|fired| *fired).await;
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Background tasks of one watch scope, torn down together
#[derive(Debug)]
pub struct WatchTasks {
    trigger: ShutdownTrigger,
    handles: Vec<JoinHandle<()>>,
}

impl WatchTasks {
    #[must_use]
    pub fn new(trigger: ShutdownTrigger) -> Self {
        Self {
            trigger,
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Signals every task and waits for all of them to finish
    pub async fn shutdown(self) {
        self.trigger.fire();
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "watch task ended abnormally");
            }
        }
    }
}

/// Consumer for one scope
pub struct ChangeStreamConsumer {
    store: Arc<dyn ObjectStore>,
    filter: NodeFilter,
    cache: Arc<GraphStateCache>,
    heartbeat: Option<Duration>,
    backoff: Duration,
}

impl std::fmt::Debug for ChangeStreamConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeStreamConsumer")
            .field("filter", &self.filter)
            .field("heartbeat", &self.heartbeat)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ChangeStreamConsumer {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        filter: NodeFilter,
        cache: Arc<GraphStateCache>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            filter,
            cache,
            heartbeat: Some(config.heartbeat_interval()),
            backoff: config.reconnect_backoff(),
        }
    }

    /// Disables the heartbeat
    #[inline]
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat = None;
        self
    }

    /// Runs the consumer on an already open stream
    pub fn spawn(
        self,
        stream: WatchStream,
        tx: mpsc::Sender<ConsumerEvent>,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(stream, tx, shutdown))
    }

    async fn run(self, mut stream: WatchStream, tx: mpsc::Sender<ConsumerEvent>, mut shutdown: ShutdownSignal) {
        let mut ticker = self.heartbeat.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        tracing::info!(project = ?self.filter.project, "change stream consumer started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = next_tick(&mut ticker) => {
                    if tx.send(ConsumerEvent::Heartbeat).await.is_err() {
                        break;
                    }
                }
                received = stream.recv() => {
                    let delivered = match received {
                        Some(event) => {
                            let (snapshot, change) = self.cache.apply(&event);
                            tx.send(ConsumerEvent::Change { snapshot, change }).await.is_ok()
                        }
                        None => {
                            stream.stop();
                            tracing::warn!(backoff = ?self.backoff, "watch channel closed, reconnecting");
                            match self.reconnect(&mut shutdown, &mut ticker, &tx).await {
                                Ok(Some((fresh, event))) => {
                                    stream = fresh;
                                    tx.send(event).await.is_ok()
                                }
                                Ok(None) => false,
                                Err(err) => {
                                    tracing::error!(error = %err, "re-subscription failed");
                                    let _ = tx.send(ConsumerEvent::Failed(err)).await;
                                    false
                                }
                            }
                        }
                    };
                    if !delivered {
                        break;
                    }
                }
            }
        }

        stream.stop();
        tracing::info!(project = ?self.filter.project, "change stream consumer stopped");
    }

    /// `Ok(None)` when shut down during the backoff
    async fn reconnect(
        &self,
        shutdown: &mut ShutdownSignal,
        ticker: &mut Option<Interval>,
        tx: &mpsc::Sender<ConsumerEvent>,
    ) -> Result<Option<(WatchStream, ConsumerEvent)>, SyncError> {
        let resume = time::sleep(self.backoff);
        tokio::pin!(resume);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(None),
                () = &mut resume => break,
                () = next_tick(ticker) => {
                    if tx.send(ConsumerEvent::Heartbeat).await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
        // Subscribe before listing so nothing between the two is lost
        let stream = self.store.watch_nodes(&self.filter).await?;
        let nodes = self.store.list_nodes(&self.filter).await?;
        let (previous, snapshot) = self.cache.replace_all(nodes);
        tracing::info!(nodes = snapshot.len(), "change stream re-subscribed");
        Ok(Some((stream, ConsumerEvent::Resync { previous, snapshot })))
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

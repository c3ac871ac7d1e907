//! FlowSync Core - synchronization and topology mutation for flow graph editors
//!
//! Keeps an editor's view of a project consistent with a remote,
//! eventually-consistent object store.
//!
//! Provides:
//! - A change stream consumer with heartbeat, reconnect and resync
//! - A per-session graph state cache with copy-on-write snapshots
//! - Incremental graph building with edge validation and visibility rules
//! - Node transfer between graphs and document import/export
//! - Single-object node edits and dashboard widgets
//!
//! # Example
//!
//! ```rust,ignore
//! use flowsync_core::{GraphSession, SessionScope, SyncConfig};
//!
//! # async fn example(store: std::sync::Arc<dyn flowsync_gateway::ObjectStore>,
//! #                  validator: std::sync::Arc<dyn flowsync_gateway::EdgeValidator>,
//! #                  sink: std::sync::Arc<dyn flowsync_core::UpdateSink>) -> Result<(), flowsync_core::SyncError> {
//! let session = GraphSession::new(store, validator, sink, SyncConfig::default());
//! let editor = session.start(SessionScope::new("demo", "demo-graph-1")).await?;
//! println!("{} elements", editor.elements.len());
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod builder;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod dashboard;
pub mod editor;
pub mod emitter;
pub mod error;
pub mod session;
pub mod topology;
pub mod visibility;

pub use builder::{BuildOptions, BuiltGraph, GraphBuilder, NodeElements};
pub use cache::{CacheChange, GraphStateCache};
pub use config::SyncConfig;
pub use consumer::{ChangeStreamConsumer, ConsumerEvent, ShutdownSignal, ShutdownTrigger, WatchTasks};
pub use dashboard::{widget_from_node, widgets_for_page, DashboardSession};
pub use editor::{BatchOutcome, NewNode, NodeEditor};
pub use emitter::{GraphUpdate, NodeUpdate, StatsBatch, UpdateEmitter, UpdateSink};
pub use error::{EditError, ImportError, SyncError, TransferError, TransferStep};
pub use session::{DataSource, EditorGraph, GraphSession, PortInspection, SessionScope};
pub use topology::{
    export_project, transfer, ElementFailure, ImportReport, Importer, TransferOutcome,
    TransferRequest,
};
pub use visibility::{BuildScope, Visibility};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the sync core
    pub use crate::{
        BuildScope, GraphSession, GraphUpdate, Importer, NodeEditor, SessionScope, SyncConfig,
        SyncError, TransferRequest, UpdateSink,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

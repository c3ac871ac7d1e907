//! FlowSync Gateway - contracts for the collaborators the sync core consumes
//!
//! Provides:
//! - Object store traits for nodes, graphs, dashboard pages and project metadata
//! - Watch streams with explicit stop
//! - The edge validator and metrics subscription seams
//! - An in-memory store for tests and local simulation

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod memory;
pub mod stats;
pub mod store;
pub mod validator;

pub use error::StoreError;
pub use memory::{Fault, MemoryStore};
pub use stats::{StatSample, StatsHub, StatsSource};
pub use store::{
    EventKind, GraphStore, NodeFilter, NodeStore, ObjectStore, PageStore, ProjectStore, WatchEvent,
    WatchStream,
};
pub use validator::{
    EdgeCheck, EdgeFailure, EdgeValidator, NodeIndex, PortProbe, RequiredFieldsValidator,
    SchemaViolation,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

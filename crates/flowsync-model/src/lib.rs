//! FlowSync Model - typed resources for flow graph editing
//!
//! Provides:
//! - Node resources with their edges and port configurations
//! - Graph and dashboard page resources
//! - Presentation records emitted to editors
//! - The versioned export document
//!
//! This crate performs no I/O; every type is plain data plus accessors.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod export;
pub mod graph;
pub mod keys;
pub mod node;
pub mod page;
pub mod port;
pub mod record;
pub mod schema;

pub use error::ModelError;
pub use export::{
    ExportDocument, ExportEdge, ExportElement, ExportGraph, ExportHandle, ExportNode, ExportPage,
    CURRENT_EXPORT_VERSION,
};
pub use graph::{Graph, Viewport};
pub use node::{
    ComponentRef, Edge, Node, NodeSpec, NodeStatus, PortConfig, PortDirection, PortStatus,
    Position, StoreMeta,
};
pub use page::{Page, Widget, WidgetPlacement};
pub use port::PortRef;
pub use record::{EdgeRecord, FallbackEdgeRecord, GraphElement, HandleRecord, NodeRecord};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the model
    pub use crate::{
        ComponentRef, Edge, Graph, GraphElement, Node, Page, PortConfig, PortRef, WidgetPlacement,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

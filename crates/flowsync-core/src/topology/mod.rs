//! Multi-object topology mutations
//!
//! Transfer and import touch several nodes without a transaction. Both
//! order their writes so that no edge is left pointing at a missing node
//! once they return, and both report what they committed.

pub mod export;
pub mod import;
pub mod naming;
pub mod transfer;

pub use export::export_project;
pub use import::{ElementFailure, ImportReport, Importer};
pub use transfer::{transfer, TransferOutcome, TransferRequest};

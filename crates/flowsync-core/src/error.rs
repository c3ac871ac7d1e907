//! Error types for the sync core
//!
//! Provides error handling for:
//! - Session lifecycle and stream failures
//! - Node transfers between graphs
//! - Document imports with partial success
//!
//! Validation failures and unresolved edge targets are not errors here: they
//! travel as data on the records the builder produces.

use crate::topology::import::ImportReport;
use flowsync_gateway::StoreError;
use flowsync_model::ModelError;
use std::fmt;

/// Session and editing errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Store call failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed model value
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Required argument missing or malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Node is not in the session cache
    #[error("node '{0}' is not in the session cache")]
    UnknownNode(String),

    /// No watch is running for this session
    #[error("session not started")]
    NotStarted,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Check if the caller may retry the operation
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_transient())
    }

    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Single-object edit errors
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// Rejected before any store call
    #[error("invalid edit: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl EditError {
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Step of a transfer that touched the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    Sharing,
    Creating,
    Deleting,
    Rewriting,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Self::Sharing => "sharing",
            Self::Creating => "creating",
            Self::Deleting => "deleting",
            Self::Rewriting => "rewriting",
        };
        f.write_str(step)
    }
}

/// Transfer errors
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Rejected before any store call
    #[error("invalid transfer request: {0}")]
    InvalidInput(String),

    /// Could not read the project
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Aborted mid-way; earlier steps are committed
    #[error("transfer aborted while {step} '{node}': {source}")]
    Step {
        step: TransferStep,
        node: String,
        #[source]
        source: StoreError,
    },
}

impl TransferError {
    #[must_use]
    pub fn step(step: TransferStep, node: impl Into<String>, source: StoreError) -> Self {
        Self::Step {
            step,
            node: node.into(),
            source,
        }
    }
}

/// Import errors
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Document rejected before any write
    #[error("invalid export document: {0}")]
    Document(#[from] ModelError),

    /// Rejected before any store call
    #[error("invalid import request: {0}")]
    InvalidInput(String),

    /// Could not read the project before importing
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Some elements failed; everything else was committed
    #[error("import partially failed: {}", .report.failure_summary())]
    Partial { report: ImportReport },
}

impl ImportError {
    /// Report of what was committed, if anything was
    #[must_use]
    pub fn report(&self) -> Option<&ImportReport> {
        match self {
            Self::Partial { report } => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_only_for_transient_store_errors() {
        assert!(SyncError::Store(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!SyncError::Store(StoreError::not_found("node", "a")).is_retryable());
        assert!(!SyncError::invalid("empty").is_retryable());
    }

    #[test]
    fn transfer_step_display() {
        let err = TransferError::step(
            TransferStep::Deleting,
            "router-1",
            StoreError::Backend("boom".into()),
        );
        assert_eq!(
            err.to_string(),
            "transfer aborted while deleting 'router-1': store backend error: boom"
        );
    }
}

//! Error types for store access

/// Failure reported by the object store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Object already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// Write lost a race with another writer
    #[error("conflicting write to '{0}'")]
    Conflict(String),

    /// Store cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Deadline elapsed before the store answered or the object became ready
    #[error("store operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Watch subscription terminated
    #[error("watch channel closed")]
    WatchClosed,

    /// Anything else the backend reports
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Check if retrying may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout { .. } | Self::WatchClosed | Self::Conflict(_)
        )
    }

    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

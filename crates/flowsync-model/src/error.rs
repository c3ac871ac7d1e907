//! Error types for the data model

/// Errors produced while parsing or validating model values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A "node:port" reference could not be parsed
    #[error("invalid port reference '{0}': expected 'node:port'")]
    InvalidPortRef(String),

    /// Export document could not be decoded
    #[error("malformed export document: {0}")]
    MalformedDocument(String),

    /// Export document version is not the one this build understands
    #[error("unsupported export version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedDocument(err.to_string())
    }
}

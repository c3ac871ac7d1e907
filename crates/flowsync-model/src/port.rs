//! Fully qualified port references ("node:port")

use crate::error::ModelError;
use crate::keys::PORT_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to a port on a named node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRef {
    pub node: String,
    pub port: String,
}

impl PortRef {
    #[inline]
    #[must_use]
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }

    /// Same port on a different node
    #[inline]
    #[must_use]
    pub fn with_node(&self, node: impl Into<String>) -> Self {
        Self::new(node, self.port.clone())
    }
}

impl FromStr for PortRef {
    type Err = ModelError;

    /// Splits on the first separator; port names may themselves contain ':'.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(PORT_SEPARATOR) {
            Some((node, port)) if !node.is_empty() && !port.is_empty() => Ok(Self::new(node, port)),
            _ => Err(ModelError::InvalidPortRef(s.to_string())),
        }
    }
}

impl TryFrom<String> for PortRef {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortRef> for String {
    fn from(value: PortRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.node, PORT_SEPARATOR, self.port)
    }
}

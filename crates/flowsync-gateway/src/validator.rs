//! Edge validation contract
//!
//! The schema engine is external. The core hands it the whole project
//! snapshot plus the resolved edge, and receives either success or a
//! structured failure it can render.

use async_trait::async_trait;
use flowsync_model::{Node, PortRef};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Project snapshot keyed by node name; ordered so iteration is deterministic
pub type NodeIndex = BTreeMap<String, Node>;

/// Resolved edge submitted for validation
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCheck {
    pub source_port: PortRef,
    pub configuration: Option<Value>,
    pub schema: Option<Value>,
    /// Observed payload for the source port, when a trace is overlaid
    pub runtime_sample: Option<Value>,
}

/// Request for sample data flowing through a port
#[derive(Debug, Clone, PartialEq)]
pub struct PortProbe {
    pub port: PortRef,
    pub runtime_sample: Option<Value>,
}

/// Schema validation failure tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaViolation {
    pub keyword_location: String,
    pub instance_location: String,
    pub message: String,
    pub causes: Vec<SchemaViolation>,
}

impl SchemaViolation {
    #[must_use]
    pub fn new(
        keyword_location: impl Into<String>,
        instance_location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            keyword_location: keyword_location.into(),
            instance_location: instance_location.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_cause(mut self, cause: SchemaViolation) -> Self {
        self.causes.push(cause);
        self
    }

    /// First leaf following the first cause at every level
    #[must_use]
    pub fn leaf(&self) -> &SchemaViolation {
        let mut leaf = self;
        while let Some(first) = leaf.causes.first() {
            leaf = first;
        }
        leaf
    }

    /// Human-readable message of the first leaf
    #[must_use]
    pub fn leaf_message(&self) -> String {
        let leaf = self.leaf();
        format!("{} {}", leaf.keyword_location, leaf.message)
    }

    /// Messages of every leaf keyed by instance location
    #[must_use]
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut BTreeMap<String, String>) {
        if self.causes.is_empty() {
            out.entry(self.instance_location.clone())
                .or_insert_with(|| self.message.clone());
            return;
        }
        for cause in &self.causes {
            cause.collect_leaves(out);
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.instance_location, self.message)
    }
}

/// Why an edge (or a port probe) failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EdgeFailure {
    #[error("schema violation at {0}")]
    Schema(SchemaViolation),

    #[error("{0}")]
    Message(String),
}

impl EdgeFailure {
    /// Leaf message for schema failures, the plain message otherwise
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Schema(violation) => violation.leaf_message(),
            Self::Message(msg) => msg.clone(),
        }
    }

    /// Per-field errors; non-schema failures map under `"error"`
    #[must_use]
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        match self {
            Self::Schema(violation) => violation.field_errors(),
            Self::Message(msg) => BTreeMap::from([("error".to_string(), msg.clone())]),
        }
    }
}

/// External schema/validation engine
#[async_trait]
pub trait EdgeValidator: Send + Sync {
    async fn validate_edge(&self, nodes: &NodeIndex, check: &EdgeCheck) -> Result<(), EdgeFailure>;

    async fn simulate_port_data(&self, nodes: &NodeIndex, probe: &PortProbe) -> Result<Value, EdgeFailure>;
}

/// Minimal in-process validator
///
/// Checks the top-level `required` keys of an edge schema against an object
/// configuration and answers port probes with the runtime sample, else the
/// port's handle-level configuration, else null.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldsValidator;

#[async_trait]
impl EdgeValidator for RequiredFieldsValidator {
    async fn validate_edge(&self, _nodes: &NodeIndex, check: &EdgeCheck) -> Result<(), EdgeFailure> {
        let Some(schema) = &check.schema else {
            return Ok(());
        };
        let Some(required) = schema.get("required").and_then(Value::as_array) else {
            return Ok(());
        };
        let config = check.configuration.as_ref().and_then(Value::as_object);
        let mut root = SchemaViolation::new("/required", "", "missing required properties");
        for key in required.iter().filter_map(Value::as_str) {
            if !config.is_some_and(|c| c.contains_key(key)) {
                root = root.with_cause(SchemaViolation::new(
                    "/required",
                    format!("/{key}"),
                    format!("missing property '{key}'"),
                ));
            }
        }
        if root.causes.is_empty() {
            Ok(())
        } else {
            Err(EdgeFailure::Schema(root))
        }
    }

    async fn simulate_port_data(&self, nodes: &NodeIndex, probe: &PortProbe) -> Result<Value, EdgeFailure> {
        if let Some(sample) = &probe.runtime_sample {
            return Ok(sample.clone());
        }
        let node = nodes
            .get(&probe.port.node)
            .ok_or_else(|| EdgeFailure::Message(format!("node '{}' not found", probe.port.node)))?;
        Ok(node
            .handle_config(&probe.port.port)
            .and_then(|pc| pc.configuration.clone())
            .unwrap_or(Value::Null))
    }
}

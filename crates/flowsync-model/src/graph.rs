//! Graph (flow) resources

use crate::keys;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named pipeline inside a project
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Resource name, the identifier nodes refer to
    pub name: String,
    pub project: String,
    /// Human-facing name
    pub display_name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Saved canvas viewport; absent fields were never stored or did not parse
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

impl Graph {
    #[must_use]
    pub fn new(name: impl Into<String>, project: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            display_name: display_name.into(),
            annotations: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        let read = |key: &str| self.annotations.get(key).and_then(|v| v.parse::<f64>().ok());
        Viewport {
            x: read(keys::VIEWPORT_X),
            y: read(keys::VIEWPORT_Y),
            zoom: read(keys::VIEWPORT_ZOOM),
        }
    }

    pub fn set_viewport(&mut self, x: f64, y: f64, zoom: f64) {
        self.annotations.insert(keys::VIEWPORT_X.to_string(), x.to_string());
        self.annotations.insert(keys::VIEWPORT_Y.to_string(), y.to_string());
        self.annotations
            .insert(keys::VIEWPORT_ZOOM.to_string(), zoom.to_string());
    }
}

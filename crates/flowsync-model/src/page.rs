//! Dashboard pages and widgets

use crate::port::PortRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default widget width in grid cells
pub const DEFAULT_WIDGET_WIDTH: u32 = 3;

/// Default widget height in grid cells
pub const DEFAULT_WIDGET_HEIGHT: u32 = 4;

/// Dashboard page holding widget placements
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub name: String,
    pub project: String,
    pub title: String,
    #[serde(default)]
    pub sort_index: i32,
    #[serde(default)]
    pub widgets: Vec<WidgetPlacement>,
}

impl Page {
    #[must_use]
    pub fn new(name: impl Into<String>, project: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_sort_index(mut self, sort_index: i32) -> Self {
        self.sort_index = sort_index;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_widget(mut self, widget: WidgetPlacement) -> Self {
        self.widgets.push(widget);
        self
    }

    #[must_use]
    pub fn placement(&self, port: &PortRef) -> Option<&WidgetPlacement> {
        self.widgets.iter().find(|w| &w.port == port)
    }
}

/// Position of a widget on a page grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetPlacement {
    pub port: PortRef,
    #[serde(default)]
    pub name: String,
    pub grid_x: u32,
    pub grid_y: u32,
    pub grid_w: u32,
    pub grid_h: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_patch: Option<Value>,
}

impl WidgetPlacement {
    #[must_use]
    pub fn new(port: PortRef, grid_x: u32, grid_y: u32) -> Self {
        Self {
            port,
            name: String::new(),
            grid_x,
            grid_y,
            grid_w: DEFAULT_WIDGET_WIDTH,
            grid_h: DEFAULT_WIDGET_HEIGHT,
            schema_patch: None,
        }
    }
}

/// Control surface of a dashboard node, as shown on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub port: PortRef,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    pub grid_x: u32,
    pub grid_y: u32,
    pub grid_w: u32,
    pub grid_h: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_patch: Option<Value>,
}

impl Widget {
    /// Applies a stored placement
    #[must_use]
    pub fn placed(mut self, placement: &WidgetPlacement) -> Self {
        self.grid_x = placement.grid_x;
        self.grid_y = placement.grid_y;
        self.grid_w = placement.grid_w;
        self.grid_h = placement.grid_h;
        self.schema_patch.clone_from(&placement.schema_patch);
        if !placement.name.is_empty() {
            self.title.clone_from(&placement.name);
        }
        self
    }
}

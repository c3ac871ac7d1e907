//! Well-known label and annotation keys
//!
//! Labels are used for selection (owning graph, project, dashboard flag);
//! annotations carry presentation state that the store never interprets.

/// Label holding the owning graph's resource name
pub const GRAPH_LABEL: &str = "flowsync.io/graph";

/// Label holding the owning project's name
pub const PROJECT_LABEL: &str = "flowsync.io/project";

/// Label marking a node for dashboard display
pub const DASHBOARD_LABEL: &str = "flowsync.io/dashboard";

pub const POSITION_X: &str = "flowsync.io/pos-x";
pub const POSITION_Y: &str = "flowsync.io/pos-y";
pub const ROTATION: &str = "flowsync.io/rotation";
pub const DISPLAY_LABEL: &str = "flowsync.io/label";
pub const COMMENT: &str = "flowsync.io/comment";

/// Comma-separated list of graphs a node is shared into
pub const SHARED_WITH: &str = "flowsync.io/shared-with-graphs";

pub const VIEWPORT_X: &str = "flowsync.io/viewport-x";
pub const VIEWPORT_Y: &str = "flowsync.io/viewport-y";
pub const VIEWPORT_ZOOM: &str = "flowsync.io/viewport-zoom";

/// Port carrying a node's control surface (dashboard widgets)
pub const CONTROL_PORT: &str = "_control";

/// Separator between node name and port name in a full port reference
pub const PORT_SEPARATOR: char = ':';

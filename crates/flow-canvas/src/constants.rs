//! Canvas-wide constants
//!
//! Single source of truth for component dimensions and configuration
//! defaults.

/// Component dimensions in graph space
pub mod dimensions {
    pub const PROCESSOR_WIDTH: f64 = 352.0;
    pub const PROCESSOR_HEIGHT: f64 = 128.0;
    /// Funnels are drawn as circles inscribed in a square of this size
    pub const FUNNEL_SIZE: f64 = 48.0;
    pub const REMOTE_PROCESS_GROUP_WIDTH: f64 = 384.0;
    pub const REMOTE_PROCESS_GROUP_HEIGHT: f64 = 176.0;
}

/// Default values for canvas configuration
pub mod defaults {
    /// Seconds between full graph refreshes
    pub const POLLING_INTERVAL_SECS: u64 = 30;
    pub const MIN_SCALE: f64 = 0.2;
    pub const MAX_SCALE: f64 = 8.0;
    /// Scale factor applied by a single zoom in/out step
    pub const ZOOM_STEP: f64 = 1.2;
    /// Below this scale entities are culled regardless of position
    pub const RENDER_THRESHOLD: f64 = 0.6;
    /// Prefix of the persisted viewport key (`<prefix>-<groupId>`)
    pub const VIEW_KEY_PREFIX: &str = "flow-view";
    /// Horizontal offset of synthesized self-loop bends from the component edge
    pub const SELF_LOOP_X_OFFSET: f64 = 75.0;
    /// Vertical half-spread of synthesized self-loop bends
    pub const SELF_LOOP_Y_OFFSET: f64 = 25.0;
    /// Padding kept around the graph by fit-to-screen
    pub const FIT_PADDING: f64 = 20.0;
    /// Container size assumed before the host reports one
    pub const CONTAINER_WIDTH: f64 = 1280.0;
    pub const CONTAINER_HEIGHT: f64 = 800.0;
}

/// Bounded id space used by the in-memory collaborator
pub mod ids {
    pub const ID_SPACE: u32 = 10_000;
    /// Random draws before creation gives up
    pub const MAX_ID_ATTEMPTS: u32 = 100;
}

/// Data storage paths
pub mod paths {
    /// Directory under the platform data dir holding persisted views
    pub const DATA_DIR: &str = "flow-canvas";
    pub const VIEWS_FILE: &str = "views.json";
}

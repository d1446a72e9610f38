//! Configuration types for the canvas

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::error::{CanvasError, Result};

/// Tunables for the canvas orchestrator and viewport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasConfig {
    /// Seconds between full graph refreshes while polling
    pub polling_interval_secs: u64,
    /// Start polling as soon as the canvas is ready
    pub auto_poll: bool,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Factor applied by zoom in/out
    pub zoom_step: f64,
    /// Minimum scale at which entities render at all
    pub render_threshold: f64,
    /// Prefix of the persisted viewport key
    pub view_key_prefix: String,
    pub self_loop_x_offset: f64,
    pub self_loop_y_offset: f64,
    pub fit_padding: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: defaults::POLLING_INTERVAL_SECS,
            auto_poll: true,
            min_scale: defaults::MIN_SCALE,
            max_scale: defaults::MAX_SCALE,
            zoom_step: defaults::ZOOM_STEP,
            render_threshold: defaults::RENDER_THRESHOLD,
            view_key_prefix: defaults::VIEW_KEY_PREFIX.to_string(),
            self_loop_x_offset: defaults::SELF_LOOP_X_OFFSET,
            self_loop_y_offset: defaults::SELF_LOOP_Y_OFFSET,
            fit_padding: defaults::FIT_PADDING,
        }
    }
}

impl CanvasConfig {
    /// Load a configuration from a JSON file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        log::debug!("Loaded canvas config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Reject scale settings the viewport cannot honour
    pub fn validate(&self) -> Result<()> {
        let scales = [self.min_scale, self.max_scale, self.zoom_step];
        if scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(CanvasError::InvalidState(format!(
                "Scale settings must be positive: min {}, max {}, step {}",
                self.min_scale, self.max_scale, self.zoom_step
            )));
        }
        if self.min_scale > self.max_scale {
            return Err(CanvasError::InvalidState(format!(
                "minScale {} exceeds maxScale {}",
                self.min_scale, self.max_scale
            )));
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    /// Key under which the viewport of `group_id` is persisted
    pub fn view_key(&self, group_id: &str) -> String {
        format!("{}-{}", self.view_key_prefix, group_id)
    }
}

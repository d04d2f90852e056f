//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "scan_interval_ms": 250, "debug_overlay": true }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rules::RuleLoadMode;

/// Tunables for discovery and navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum time between two scans of the same surface.
    pub scan_interval_ms: u64,
    /// Perpendicular offset (device-independent pixels) under which a
    /// directional candidate counts as aligned.
    pub alignment_tolerance: f64,
    /// Cost multiplier for candidates sharing the focused node's parent.
    pub same_parent_bonus: f64,
    /// Cost multiplier for aligned candidates.
    pub alignment_bonus: f64,
    /// Row weight in the reading-order score used for initial focus.
    pub reading_order_weight: f64,
    pub rule_mode: RuleLoadMode,
    /// Send leaf and group rectangles to the renderer after every scan.
    pub debug_overlay: bool,
    /// Maximum display width of a shortcut key title.
    pub key_title_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 500,
            alignment_tolerance: 20.0,
            same_parent_bonus: 0.7,
            alignment_bonus: 0.8,
            reading_order_weight: 10_000.0,
            rule_mode: RuleLoadMode::default(),
            debug_overlay: false,
            key_title_width: 10,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Parse a JSON config; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

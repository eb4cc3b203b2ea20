use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::model::anchor::AnchorMovement;

/// Document engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DocumentConfig {
    /// Check every tree invariant after each edit and panic on corruption.
    /// Meant for tests and debugging; costs O(n) per edit.
    #[serde(default = "default_false")]
    pub verify_invariants: bool,

    /// Movement policy of anchors created without an explicit one
    #[serde(default)]
    pub default_movement: AnchorMovement,

    /// Whether anchors created without an explicit flag survive the
    /// deletion of their surrounding text
    #[serde(default = "default_false")]
    pub default_survive_deletion: bool,

    /// Number of edits between sweeps that reclaim anchors whose handles were
    /// all dropped (0 disables the periodic sweep)
    #[serde(default = "default_anchor_sweep_interval")]
    pub anchor_sweep_interval: usize,
}

fn default_false() -> bool {
    false
}

fn default_anchor_sweep_interval() -> usize {
    256
}

/// Lowest non-zero sweep interval accepted by `validate`.
const MIN_ANCHOR_SWEEP_INTERVAL: usize = 8;

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            verify_invariants: false,
            default_movement: AnchorMovement::default(),
            default_survive_deletion: false,
            anchor_sweep_interval: default_anchor_sweep_interval(),
        }
    }
}

impl DocumentConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: DocumentConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.anchor_sweep_interval != 0
            && self.anchor_sweep_interval < MIN_ANCHOR_SWEEP_INTERVAL
        {
            return Err(ConfigError::Validation(format!(
                "anchor_sweep_interval must be 0 or at least {MIN_ANCHOR_SWEEP_INTERVAL}"
            )));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

//! Engine configuration – every stage's settings in one serde document.
//!
//! All fields are optional in JSON; missing ones take the press defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::composer::ComposerConfig;
use crate::error::ConfigError;
use crate::placement::PlacementConfig;
use crate::validation::ValidatorConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Concurrent codec workers.
    pub workers: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validator: ValidatorConfig,
    pub optimizer: OptimizerConfig,
    pub placement: PlacementConfig,
    pub composer: ComposerConfig,
    /// Deadline for the store read, in milliseconds. `None` waits forever.
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            optimizer: OptimizerConfig::default(),
            placement: PlacementConfig::default(),
            composer: ComposerConfig::default(),
            fetch_timeout_ms: Some(10_000),
        }
    }
}

impl EngineConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Reject values no stage can work with.
    pub fn check(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };

        if self.optimizer.workers == 0 {
            return invalid("optimizer.workers", "must be at least 1");
        }
        if self.placement.items_per_page == 0 {
            return invalid("placement.items_per_page", "must be at least 1");
        }
        if !is_non_negative(self.placement.safe_inset_mm) {
            return invalid("placement.safe_inset_mm", "must be a non-negative number");
        }
        if !is_non_negative(self.placement.gutter_mm) {
            return invalid("placement.gutter_mm", "must be a non-negative number");
        }
        if !is_non_negative(self.validator.min_bleed_mm) {
            return invalid("validator.min_bleed_mm", "must be a non-negative number");
        }
        if !(self.composer.guide_width_pt.is_finite() && self.composer.guide_width_pt > 0.0) {
            return invalid("composer.guide_width_pt", "must be positive");
        }
        if self.fetch_timeout_ms == Some(0) {
            return invalid("fetch_timeout_ms", "use null to disable the deadline");
        }
        Ok(())
    }
}

fn is_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

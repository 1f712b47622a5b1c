//! Engine configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::nodes::ComputeContext;

/// Tunables for evaluation passes. Every field has a default, so a
/// config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the blank image an unconnected Combine node produces
    pub default_width: u32,
    pub default_height: u32,
    /// Largest width or height any node may allocate
    pub max_dimension: u32,
    /// Per-node compute limit. `None` waits forever.
    pub compute_timeout_ms: Option<u64>,
    /// Quiet period before a requested pass starts
    pub debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let ctx = ComputeContext::default();
        Self {
            default_width: ctx.default_width,
            default_height: ctx.default_height,
            max_dimension: ctx.max_dimension,
            compute_timeout_ms: None,
            debounce_ms: 0,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded engine config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn compute_context(&self) -> ComputeContext {
        ComputeContext {
            default_width: self.default_width.max(1),
            default_height: self.default_height.max(1),
            max_dimension: self.max_dimension.max(1),
        }
    }

    pub fn compute_timeout(&self) -> Option<Duration> {
        self.compute_timeout_ms.map(Duration::from_millis)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

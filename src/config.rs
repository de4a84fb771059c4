// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Loaded from YAML. Every field has a default, so an empty file (or no file
//! at all) gives the stock engine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::bundle::ExportOptions;
use crate::error::FlowError;
use crate::flow::executor::ExecutorConfig;
use crate::flow::layout::LayoutConfig;

/// Overrides `executor.max_steps`
pub const MAX_STEPS_ENV: &str = "AUTOFLOW_MAX_STEPS";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub executor: ExecutorConfig,
    pub export: ExportOptions,
}

impl EngineConfig {
    /// Load from a YAML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FlowError> {
        let content = fs::read_to_string(path.as_ref())?;
        let mut config = Self::parse_yaml(&content)?;
        config.apply_env()?;
        log::debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, FlowError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn parse_yaml(content: &str) -> Result<Self, FlowError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), FlowError> {
        if let Ok(value) = std::env::var(MAX_STEPS_ENV) {
            self.executor.max_steps = value.trim().parse().map_err(|_| {
                FlowError::config(format!("{} must be a positive integer, got '{}'", MAX_STEPS_ENV, value))
            })?;
        }
        Ok(())
    }

    /// Export options carrying this config's layout for unplaced nodes
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            layout: self.layout.clone(),
            ..self.export.clone()
        }
    }
}

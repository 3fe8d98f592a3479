//! Run configuration.
//!
//! Everything a training run can vary lives here and is passed in
//! explicitly: input location and archive keys, the stage layout, split
//! fraction, seed, activation, orthogonalization switch and solver. The
//! struct can be read from a TOML file; the CLI overrides individual fields.

use crate::archive::{DEFAULT_SIGNAL_KEY, DEFAULT_THICKNESS_KEY};
use crate::error::ElmError;
use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TRAIN_FRACTION: f64 = 0.75;
pub const DEFAULT_PLOT_POINTS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<PathBuf>,
    pub signal_key: String,
    pub thickness_key: String,
    pub train_fraction: f64,
    pub plot_points: usize,
    pub pipeline: PipelineConfig,
}

impl Default for ElmConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            signal_key: DEFAULT_SIGNAL_KEY.to_string(),
            thickness_key: DEFAULT_THICKNESS_KEY.to_string(),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            plot_points: DEFAULT_PLOT_POINTS,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ElmConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ElmError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ElmError> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(ElmError::invalid(
                "configuration",
                format!(
                    "train_fraction must lie strictly between 0 and 1, got {}",
                    self.train_fraction
                ),
            ));
        }
        if self.plot_points == 0 {
            return Err(ElmError::invalid(
                "configuration",
                "plot_points must be at least 1",
            ));
        }
        self.pipeline.validate()
    }
}

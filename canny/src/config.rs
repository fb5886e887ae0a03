use std::path::Path;

use common::file_format::SerdeFormat;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::partition::Partition;
use crate::worker::WorkerKind;

/// Host share of each partitioned stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagePartitions {
    pub gaussian: Partition,
    pub derivative: Partition,
    pub magnitude: Partition,
}

impl StagePartitions {
    pub fn uniform(partition: Partition) -> Self {
        Self {
            gaussian: partition,
            derivative: partition,
            magnitude: partition,
        }
    }
}

/// Hysteresis fractions: `high` of the candidate edge pixels fall below the
/// high threshold, and the low threshold is `low` times the high one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisThresholds {
    pub low: f32,
    pub high: f32,
}

impl Default for HysteresisThresholds {
    fn default() -> Self {
        Self {
            low: 0.5,
            high: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub partitions: StagePartitions,
    pub host_worker: WorkerKind,
    pub remote_worker: WorkerKind,
    /// Run the writeback diagnostic before the Gaussian stage.
    pub writeback: bool,
    /// Diff every stage against a full-image scalar reference.
    pub verify: bool,
    pub hysteresis: HysteresisThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partitions: StagePartitions::default(),
            host_worker: WorkerKind::Vector,
            remote_worker: WorkerKind::Scalar,
            writeback: false,
            verify: false,
            hysteresis: HysteresisThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a YAML or JSON file, picked by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = SerdeFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(format, &text)
    }

    pub fn parse(format: SerdeFormat, text: &str) -> Result<Self, ConfigError> {
        let config: Self = format.deserialize(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("low", self.hysteresis.low),
            ("high", self.hysteresis.high),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

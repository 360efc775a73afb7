//! Application configuration
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a valid configuration.

use crate::features::{FeatureLayout, HandSelection};
use crate::recorder::RecordingConfig;
use crate::training::{Hyperparameters, TrainingError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Data directory used when none is configured
pub const DEFAULT_DATA_DIR: &str = "gesture-data";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Hand tracking options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisionConfig {
    pub hand_selection: HandSelection,
    pub layout: FeatureLayout,

    /// Whether the consuming view is mirrored relative to the detector
    pub mirror_input: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            hand_selection: HandSelection::Both,
            layout: FeatureLayout::TwoHands,
            mirror_input: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionConfig {
    /// How long a prediction must be held before it is emitted
    pub hold_threshold_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            hold_threshold_ms: 1000,
        }
    }
}

impl RecognitionConfig {
    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_threshold_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub recording: RecordingConfig,
    pub recognition: RecognitionConfig,
    pub training: Hyperparameters,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.vision.layout.supports(self.vision.hand_selection) {
            return Err(ConfigError::Invalid(format!(
                "hand selection {:?} needs a two-hand layout",
                self.vision.hand_selection
            )));
        }
        if self.recording.cadence_ms == 0 {
            return Err(ConfigError::Invalid(
                "recording cadence must be greater than zero".to_string(),
            ));
        }
        self.training.validate().map_err(|e| match e {
            TrainingError::InvalidHyperparameters(detail) => ConfigError::Invalid(detail),
            other => ConfigError::Invalid(other.to_string()),
        })
    }
}

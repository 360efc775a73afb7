//! Training types and configuration
//!
//! Hyperparameters handed to the classifier backend, the progress events a
//! training run produces, and the errors it can fail with.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Fewest labels a classifier can be trained on
pub const MIN_LABELS: usize = 2;

/// Fewest samples every label needs before training
pub const MIN_SAMPLES_PER_LABEL: usize = 10;

/// Parameters passed through to the classifier backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hyperparameters {
    pub epochs: usize,
    pub learning_rate: f32,

    /// Fraction of the shuffled examples held out for validation
    pub validation_split_ratio: f32,

    pub batch_size: usize,

    /// Fixed seed for reproducible shuffles (None = fresh entropy per run)
    pub seed: Option<u64>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            epochs: 50,
            learning_rate: 0.001,
            validation_split_ratio: 0.2,
            batch_size: 16,
            seed: None,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.epochs == 0 {
            return Err(TrainingError::InvalidHyperparameters(
                "epochs must be at least 1".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidHyperparameters(format!(
                "learning rate must be a positive number (got {})",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.validation_split_ratio) {
            return Err(TrainingError::InvalidHyperparameters(format!(
                "validation split ratio must be in [0, 1) (got {})",
                self.validation_split_ratio
            )));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidHyperparameters(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Progress reported by the backend after each epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochProgress {
    /// Zero-based epoch index
    pub epoch_index: usize,
    pub total_epochs: usize,
    pub loss: Option<f32>,
    pub training_accuracy: Option<f32>,
    pub validation_accuracy: Option<f32>,
}

impl EpochProgress {
    /// Progress percentage (0.0 to 100.0)
    pub fn percent(&self) -> f32 {
        if self.total_epochs == 0 {
            return 0.0;
        }
        ((self.epoch_index + 1) as f32 / self.total_epochs as f32 * 100.0).min(100.0)
    }

    /// Validation accuracy when available, training accuracy otherwise
    pub fn headline_accuracy(&self) -> Option<f32> {
        self.validation_accuracy.or(self.training_accuracy)
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub classifier_id: Uuid,
    pub labels: Vec<String>,
    pub example_count: usize,
    pub epochs: usize,
    pub final_validation_accuracy: Option<f32>,
}

/// Events of one training run
///
/// Zero or more `Epoch` events followed by exactly one `Completed` or
/// `Failed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TrainingEvent {
    Epoch(EpochProgress),
    Completed(TrainingSummary),
    Failed { message: String },
}

impl TrainingEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrainingEvent::Epoch(_))
    }
}

/// Training errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("At least {} labels are required to train (have {have})", MIN_LABELS)]
    InsufficientLabels { have: usize },

    #[error("Label '{label}' needs at least {need} samples (has {have})")]
    InsufficientSamples {
        label: String,
        have: usize,
        need: usize,
    },

    #[error("Sample #{index} of label '{label}' is corrupt: {detail}")]
    CorruptSample {
        label: String,
        index: usize,
        detail: String,
    },

    #[error("Invalid hyperparameters: {0}")]
    InvalidHyperparameters(String),

    #[error("A training run is already in progress")]
    TrainingInProgress,

    #[error("Training backend failure: {0}")]
    BackendFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hyperparameters_are_valid() {
        assert!(Hyperparameters::default().validate().is_ok());
    }

    #[test]
    fn test_hyperparameter_validation() {
        let bad_split = Hyperparameters {
            validation_split_ratio: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_split.validate(),
            Err(TrainingError::InvalidHyperparameters(_))
        ));

        let bad_rate = Hyperparameters {
            learning_rate: f32::NAN,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());

        let no_epochs = Hyperparameters {
            epochs: 0,
            ..Default::default()
        };
        assert!(no_epochs.validate().is_err());
    }

    #[test]
    fn test_epoch_progress_percent() {
        let progress = EpochProgress {
            epoch_index: 4,
            total_epochs: 10,
            loss: None,
            training_accuracy: Some(0.8),
            validation_accuracy: None,
        };
        assert!((progress.percent() - 50.0).abs() < 1e-4);
        assert_eq!(progress.headline_accuracy(), Some(0.8));
    }

    #[test]
    fn test_training_event_serializes_with_type_tag() {
        let event = TrainingEvent::Failed {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert!(event.is_terminal());
    }
}

//! Error types and handling
//!
//! Aggregates the per-module errors for hosts that want one error type and
//! a stable code per failure.

use crate::config::ConfigError;
use crate::recorder::RecordingError;
use crate::samples::StoreError;
use crate::storage::PersistError;
use crate::training::{BackendError, TrainingError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sample store error: {0}")]
    Store(#[from] StoreError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    #[error("Classifier error: {0}")]
    Backend(#[from] BackendError),

    #[error("Storage error: {0}")]
    Persist(#[from] PersistError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No trained classifier is loaded")]
    NoClassifier,
}

impl AppError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Io(_) => "IO_ERROR",
            AppError::Store(e) => match e {
                StoreError::EmptyName => "EMPTY_NAME",
                StoreError::DuplicateLabel(_) => "DUPLICATE_LABEL",
                StoreError::UnknownLabel(_) => "UNKNOWN_LABEL",
                StoreError::SizeMismatch { .. } => "SIZE_MISMATCH",
                StoreError::NonFiniteValue { .. } => "NON_FINITE_VALUE",
                StoreError::LayoutLocked { .. } => "LAYOUT_LOCKED",
            },
            AppError::Recording(e) => match e {
                RecordingError::NoActiveFrame => "NO_ACTIVE_FRAME",
                RecordingError::UnknownLabel(_) => "UNKNOWN_LABEL",
                RecordingError::InvalidCadence => "INVALID_CADENCE",
                RecordingError::Store(_) => "RECORDING_ERROR",
            },
            AppError::Training(e) => match e {
                TrainingError::InsufficientLabels { .. } => "INSUFFICIENT_LABELS",
                TrainingError::InsufficientSamples { .. } => "INSUFFICIENT_SAMPLES",
                TrainingError::CorruptSample { .. } => "CORRUPT_SAMPLE",
                TrainingError::InvalidHyperparameters(_) => "INVALID_HYPERPARAMETERS",
                TrainingError::TrainingInProgress => "TRAINING_IN_PROGRESS",
                TrainingError::BackendFailure(_) => "TRAINING_BACKEND_FAILURE",
            },
            AppError::Backend(_) => "CLASSIFIER_ERROR",
            AppError::Persist(_) => "STORAGE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::NoClassifier => "NO_CLASSIFIER",
        }
    }
}

/// Error response for hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

//! Classifier backend boundary
//!
//! The classifier itself is an external service: the core hands it data and
//! hyperparameters and gets back an opaque model. `ClassifierSlot` holds the
//! live model and swaps it atomically when a new one finishes training.

use super::types::{EpochProgress, Hyperparameters};
use crate::features::{FeatureLayout, FeatureVector};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors reported by a classifier backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Training failed: {0}")]
    Training(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Invalid model data: {0}")]
    InvalidModel(String),
}

/// Flattened dataset handed to `ClassifierBackend::fit`
#[derive(Debug, Clone)]
pub struct FitRequest {
    pub inputs: Vec<Vec<f32>>,
    pub class_indices: Vec<usize>,
    pub num_classes: usize,
    pub hyperparameters: Hyperparameters,
}

/// A trained model as produced by a backend
pub trait ClassifierModel: Send + Sync + std::fmt::Debug {
    fn num_classes(&self) -> usize;

    /// One score per class
    fn predict(&self, input: &[f32]) -> Result<Vec<f32>, BackendError>;

    /// Serialize the model to an opaque blob
    fn save(&self) -> Result<Vec<u8>, BackendError>;
}

/// A trainable classifier service
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Short identifier written into saved model bundles
    fn name(&self) -> &'static str;

    /// Train a model, sending one progress notification per epoch
    async fn fit(
        &self,
        request: FitRequest,
        progress: mpsc::UnboundedSender<EpochProgress>,
    ) -> Result<Box<dyn ClassifierModel>, BackendError>;

    /// Rebuild a model from a blob produced by `ClassifierModel::save`
    fn load(&self, blob: &[u8]) -> Result<Box<dyn ClassifierModel>, BackendError>;
}

/// A trained model together with the label mapping it was trained against
#[derive(Debug)]
pub struct TrainedClassifier {
    pub id: Uuid,
    pub labels: Vec<String>,
    pub layout: FeatureLayout,
    pub trained_at: DateTime<Utc>,
    model: Box<dyn ClassifierModel>,
}

impl TrainedClassifier {
    pub fn new(labels: Vec<String>, layout: FeatureLayout, model: Box<dyn ClassifierModel>) -> Self {
        Self {
            id: Uuid::new_v4(),
            labels,
            layout,
            trained_at: Utc::now(),
            model,
        }
    }

    /// Rebuild a classifier that was saved earlier, keeping its identity
    pub fn restored(
        id: Uuid,
        labels: Vec<String>,
        layout: FeatureLayout,
        trained_at: DateTime<Utc>,
        model: Box<dyn ClassifierModel>,
    ) -> Self {
        Self {
            id,
            labels,
            layout,
            trained_at,
            model,
        }
    }

    /// Score every label for one feature vector
    pub fn predict(&self, features: &FeatureVector) -> Result<Vec<f32>, BackendError> {
        if features.len() != self.layout.vector_len() {
            return Err(BackendError::Prediction(format!(
                "classifier expects {} features, got {}",
                self.layout.vector_len(),
                features.len()
            )));
        }
        self.model.predict(features.as_slice())
    }

    pub fn model(&self) -> &dyn ClassifierModel {
        self.model.as_ref()
    }
}

/// Shared holder of the live classifier
///
/// Readers clone the inner `Arc`, so they always see either the old or the
/// new classifier in full.
#[derive(Debug, Clone, Default)]
pub struct ClassifierSlot {
    inner: Arc<RwLock<Option<Arc<TrainedClassifier>>>>,
}

impl ClassifierSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<TrainedClassifier>> {
        self.inner.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Replace the live classifier, returning the previous one
    pub fn install(&self, classifier: TrainedClassifier) -> Option<Arc<TrainedClassifier>> {
        let classifier = Arc::new(classifier);
        tracing::info!(
            "Installing classifier {} ({} classes)",
            classifier.id,
            classifier.labels.len()
        );
        self.inner.write().replace(classifier)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend used by pipeline and recognition tests

    use super::*;

    /// Model returning a fixed score vector
    #[derive(Debug, Clone)]
    pub struct FixedModel {
        pub scores: Vec<f32>,
    }

    impl ClassifierModel for FixedModel {
        fn num_classes(&self) -> usize {
            self.scores.len()
        }

        fn predict(&self, _input: &[f32]) -> Result<Vec<f32>, BackendError> {
            Ok(self.scores.clone())
        }

        fn save(&self) -> Result<Vec<u8>, BackendError> {
            Ok(self
                .scores
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect())
        }
    }

    /// Model whose predictions always fail
    #[derive(Debug)]
    pub struct BrokenModel;

    impl ClassifierModel for BrokenModel {
        fn num_classes(&self) -> usize {
            2
        }

        fn predict(&self, _input: &[f32]) -> Result<Vec<f32>, BackendError> {
            Err(BackendError::Prediction("device lost".to_string()))
        }

        fn save(&self) -> Result<Vec<u8>, BackendError> {
            Err(BackendError::InvalidModel("nothing to save".to_string()))
        }
    }

    /// Backend that reports scripted epochs, records what it was asked to
    /// fit, and optionally fails
    #[derive(Debug, Default)]
    pub struct ScriptedBackend {
        pub fail_with: Option<String>,
        pub calls: parking_lot::Mutex<Vec<FitRequest>>,
    }

    impl ScriptedBackend {
        pub fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ClassifierBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fit(
            &self,
            request: FitRequest,
            progress: mpsc::UnboundedSender<EpochProgress>,
        ) -> Result<Box<dyn ClassifierModel>, BackendError> {
            let epochs = request.hyperparameters.epochs;
            let num_classes = request.num_classes;
            self.calls.lock().push(request);

            for epoch_index in 0..epochs {
                let _ = progress.send(EpochProgress {
                    epoch_index,
                    total_epochs: epochs,
                    loss: None,
                    training_accuracy: Some(0.5),
                    validation_accuracy: Some(0.4),
                });
            }

            match &self.fail_with {
                Some(message) => Err(BackendError::Training(message.clone())),
                None => {
                    let mut scores = vec![0.0; num_classes];
                    scores[0] = 1.0;
                    Ok(Box::new(FixedModel { scores }))
                }
            }
        }

        fn load(&self, blob: &[u8]) -> Result<Box<dyn ClassifierModel>, BackendError> {
            let scores = blob
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Ok(Box::new(FixedModel { scores }))
        }
    }
}

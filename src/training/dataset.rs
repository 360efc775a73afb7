//! Training set assembly
//!
//! Flattens the sample store into (vector, class index) pairs, checks the
//! preconditions and every vector, and shuffles. Nothing here touches the
//! classifier backend, so a failure leaves the live classifier untouched.

use super::classifier::FitRequest;
use super::types::{Hyperparameters, TrainingError, MIN_LABELS, MIN_SAMPLES_PER_LABEL};
use crate::features::{FeatureLayout, FeatureVector};
use crate::samples::SampleStore;
use rand::seq::SliceRandom;
use rand::Rng;

/// One labeled training input
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub class_index: usize,
}

/// Validated, flattened sample set ready for a backend
#[derive(Debug, Clone)]
pub struct TrainingSet {
    labels: Vec<String>,
    layout: FeatureLayout,
    examples: Vec<TrainingExample>,
}

impl TrainingSet {
    /// Check preconditions and flatten the store in label registration order
    pub fn assemble(store: &SampleStore) -> Result<Self, TrainingError> {
        if store.label_count() < MIN_LABELS {
            return Err(TrainingError::InsufficientLabels {
                have: store.label_count(),
            });
        }

        if let Some(entry) = store
            .entries()
            .iter()
            .find(|entry| entry.samples.len() < MIN_SAMPLES_PER_LABEL)
        {
            return Err(TrainingError::InsufficientSamples {
                label: entry.name.clone(),
                have: entry.samples.len(),
                need: MIN_SAMPLES_PER_LABEL,
            });
        }

        let expected = store.vector_len();
        let mut examples = Vec::with_capacity(store.total_sample_count());
        for (class_index, entry) in store.entries().iter().enumerate() {
            for (index, features) in entry.samples.iter().enumerate() {
                validate_vector(features, expected).map_err(|detail| {
                    TrainingError::CorruptSample {
                        label: entry.name.clone(),
                        index,
                        detail,
                    }
                })?;
                examples.push(TrainingExample {
                    features: features.clone(),
                    class_index,
                });
            }
        }

        Ok(Self {
            labels: store.labels(),
            layout: store.layout(),
            examples,
        })
    }

    /// Uniform random permutation of the examples
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.examples.shuffle(rng);
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Split into the backend request and the label mapping it refers to
    pub fn into_request(self, hyperparameters: Hyperparameters) -> (FitRequest, Vec<String>, FeatureLayout) {
        let num_classes = self.labels.len();
        let (inputs, class_indices) = self
            .examples
            .into_iter()
            .map(|example| (example.features.into_inner(), example.class_index))
            .unzip();

        let request = FitRequest {
            inputs,
            class_indices,
            num_classes,
            hyperparameters,
        };
        (request, self.labels, self.layout)
    }
}

fn validate_vector(features: &FeatureVector, expected: usize) -> Result<(), String> {
    if features.len() != expected {
        return Err(format!(
            "vector has {} values, expected {}",
            features.len(),
            expected
        ));
    }
    if let Some((position, value)) = features.first_non_finite() {
        return Err(format!("component {position} is not a finite number ({value})"));
    }
    Ok(())
}

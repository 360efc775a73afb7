//! Labeled sample storage
//!
//! The store owns the label set and every captured feature vector. Label
//! order is insertion order and doubles as the classifier's class index
//! mapping. Every mutation validates first and only then touches state, so a
//! failed call leaves the store exactly as it was.

use crate::features::{FeatureLayout, FeatureVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-label sample count the capture UI aims for
pub const TARGET_SAMPLES_PER_LABEL: usize = 30;

/// Sample store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Label name must not be empty")]
    EmptyName,

    #[error("Label already exists: {0}")]
    DuplicateLabel(String),

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Feature vector has {actual} values, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Feature vector component {position} is not a finite number")]
    NonFiniteValue { position: usize },

    #[error("Feature layout cannot change while {samples} samples exist")]
    LayoutLocked { samples: usize },
}

/// One label and its captured vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSamples {
    pub name: String,
    pub samples: Vec<FeatureVector>,
}

/// Serializable image of the whole store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub layout: FeatureLayout,
    pub labels: Vec<LabelSamples>,
}

/// Read-only view of one label for progress display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSummary {
    pub name: String,
    pub samples: usize,

    /// Fraction of `TARGET_SAMPLES_PER_LABEL` reached, capped at 1.0
    pub progress: f32,
}

#[derive(Debug, Clone)]
pub struct SampleStore {
    layout: FeatureLayout,
    entries: Vec<LabelSamples>,
}

impl SampleStore {
    pub fn new(layout: FeatureLayout) -> Self {
        Self {
            layout,
            entries: Vec::new(),
        }
    }

    /// Rebuild a store from a snapshot, validating every vector
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StoreError> {
        let mut store = Self::new(snapshot.layout);
        for entry in snapshot.labels {
            store.add_label(&entry.name)?;
            let expected = store.vector_len();
            if let Some(bad) = entry.samples.iter().find(|v| v.len() != expected) {
                return Err(StoreError::SizeMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
            if let Some(slot) = store.entries.last_mut() {
                slot.samples = entry.samples;
            }
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            layout: self.layout,
            labels: self.entries.clone(),
        }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Length every stored vector must have
    pub fn vector_len(&self) -> usize {
        self.layout.vector_len()
    }

    /// Register a new label with no samples
    pub fn add_label(&mut self, name: &str) -> Result<(), StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        if self.position(name).is_some() {
            return Err(StoreError::DuplicateLabel(name.to_string()));
        }

        self.entries.push(LabelSamples {
            name: name.to_string(),
            samples: Vec::new(),
        });
        tracing::debug!("Added label '{}' at index {}", name, self.entries.len() - 1);
        Ok(())
    }

    /// Delete a label together with all of its samples
    pub fn remove_label(&mut self, name: &str) -> Result<(), StoreError> {
        let index = self.require(name)?;
        let removed = self.entries.remove(index);
        tracing::debug!(
            "Removed label '{}' ({} samples)",
            removed.name,
            removed.samples.len()
        );
        Ok(())
    }

    /// Append one vector to a label, returning the label's new sample count
    pub fn append_sample(&mut self, name: &str, vector: FeatureVector) -> Result<usize, StoreError> {
        let index = self.require(name)?;
        let expected = self.vector_len();
        if vector.len() != expected {
            return Err(StoreError::SizeMismatch {
                expected,
                actual: vector.len(),
            });
        }
        if let Some((position, _)) = vector.first_non_finite() {
            return Err(StoreError::NonFiniteValue { position });
        }

        let samples = &mut self.entries[index].samples;
        samples.push(vector);
        Ok(samples.len())
    }

    /// Empty one label's samples, keeping the label
    pub fn clear_samples(&mut self, name: &str) -> Result<(), StoreError> {
        let index = self.require(name)?;
        self.entries[index].samples.clear();
        Ok(())
    }

    /// Switch to another feature layout
    ///
    /// Existing samples would no longer match the vector length, so the
    /// switch is refused unless the caller agrees to wipe them.
    pub fn reconfigure_layout(&mut self, layout: FeatureLayout, wipe: bool) -> Result<(), StoreError> {
        if layout == self.layout {
            return Ok(());
        }
        let samples = self.total_sample_count();
        if samples > 0 && !wipe {
            return Err(StoreError::LayoutLocked { samples });
        }

        for entry in &mut self.entries {
            entry.samples.clear();
        }
        tracing::info!(
            "Feature layout changed to {:?}, discarded {} samples",
            layout,
            samples
        );
        self.layout = layout;
        Ok(())
    }

    pub fn sample_count(&self, name: &str) -> Result<usize, StoreError> {
        let index = self.require(name)?;
        Ok(self.entries[index].samples.len())
    }

    pub fn total_sample_count(&self) -> usize {
        self.entries.iter().map(|e| e.samples.len()).sum()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Class index of a label
    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.position(name)
    }

    /// Labels in registration order
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn label_count(&self) -> usize {
        self.entries.len()
    }

    pub fn samples(&self, name: &str) -> Result<&[FeatureVector], StoreError> {
        let index = self.require(name)?;
        Ok(&self.entries[index].samples)
    }

    /// Labels with their samples, in registration order
    pub fn entries(&self) -> &[LabelSamples] {
        &self.entries
    }

    pub fn summaries(&self) -> Vec<LabelSummary> {
        self.entries
            .iter()
            .map(|entry| {
                let samples = entry.samples.len();
                LabelSummary {
                    name: entry.name.clone(),
                    samples,
                    progress: (samples as f32 / TARGET_SAMPLES_PER_LABEL as f32).min(1.0),
                }
            })
            .collect()
    }

    /// Names are stored trimmed, so lookups trim too
    fn position(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.entries.iter().position(|e| e.name == name)
    }

    fn require(&self, name: &str) -> Result<usize, StoreError> {
        self.position(name)
            .ok_or_else(|| StoreError::UnknownLabel(name.trim().to_string()))
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new(FeatureLayout::default())
    }
}

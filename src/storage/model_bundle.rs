//! Trained model bundles
//!
//! A model bundle is a directory containing:
//! - meta.json: Classifier id, backend name, feature layout and timestamps
//! - labels.json: Label names in class-index order
//! - model.bin: The backend's opaque model blob

use super::repository::PersistError;
use crate::features::FeatureLayout;
use crate::training::{ClassifierBackend, TrainedClassifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

pub const MODEL_META_FILE: &str = "meta.json";
pub const LABELS_FILE: &str = "labels.json";
pub const MODEL_FILE: &str = "model.bin";

const MODEL_FORMAT: &str = "gsm-v1";

/// Contents of a bundle's meta.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMeta {
    pub id: Uuid,
    pub version: String,
    pub format: String,
    pub backend: String,
    pub layout: FeatureLayout,
    pub trained_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

/// Write a classifier to a bundle directory
pub fn write_model(
    classifier: &TrainedClassifier,
    backend_name: &str,
    bundle_path: &Path,
) -> Result<(), PersistError> {
    if !bundle_path.exists() {
        fs::create_dir_all(bundle_path)?;
    }

    let blob = classifier.model().save()?;
    fs::write(bundle_path.join(MODEL_FILE), blob)?;

    let labels_content = serde_json::to_string_pretty(&classifier.labels)?;
    fs::write(bundle_path.join(LABELS_FILE), labels_content)?;

    let meta = ModelMeta {
        id: classifier.id,
        version: env!("CARGO_PKG_VERSION").to_string(),
        format: MODEL_FORMAT.to_string(),
        backend: backend_name.to_string(),
        layout: classifier.layout,
        trained_at: classifier.trained_at,
        saved_at: Utc::now(),
    };
    let meta_content = serde_json::to_string_pretty(&meta)?;
    fs::write(bundle_path.join(MODEL_META_FILE), meta_content)?;

    tracing::debug!("Saved classifier {} to {:?}", classifier.id, bundle_path);
    Ok(())
}

/// Read bundle metadata
pub fn read_meta(bundle_path: &Path) -> Result<ModelMeta, PersistError> {
    let meta_path = bundle_path.join(MODEL_META_FILE);
    if !meta_path.exists() {
        return Err(PersistError::MissingFile(MODEL_META_FILE.to_string()));
    }
    let meta_content = fs::read_to_string(&meta_path)?;
    Ok(serde_json::from_str(&meta_content)?)
}

/// Read a classifier back through the backend that produced it
pub fn read_model(
    backend: &dyn ClassifierBackend,
    bundle_path: &Path,
) -> Result<TrainedClassifier, PersistError> {
    if !bundle_path.is_dir() {
        return Err(PersistError::InvalidData(
            "Path is not a directory".to_string(),
        ));
    }

    let meta = read_meta(bundle_path)?;
    if meta.backend != backend.name() {
        return Err(PersistError::InvalidData(format!(
            "bundle was written by the '{}' backend, not '{}'",
            meta.backend,
            backend.name()
        )));
    }

    let labels_path = bundle_path.join(LABELS_FILE);
    if !labels_path.exists() {
        return Err(PersistError::MissingFile(LABELS_FILE.to_string()));
    }
    let labels: Vec<String> = serde_json::from_str(&fs::read_to_string(&labels_path)?)?;

    let model_path = bundle_path.join(MODEL_FILE);
    if !model_path.exists() {
        return Err(PersistError::MissingFile(MODEL_FILE.to_string()));
    }
    let model = backend.load(&fs::read(&model_path)?)?;

    if model.num_classes() != labels.len() {
        return Err(PersistError::InvalidData(format!(
            "model has {} classes but {} labels are listed",
            model.num_classes(),
            labels.len()
        )));
    }

    tracing::debug!(
        "Loaded classifier {} ({} labels) from {:?}",
        meta.id,
        labels.len(),
        bundle_path
    );
    Ok(TrainedClassifier::restored(
        meta.id,
        labels,
        meta.layout,
        meta.trained_at,
        model,
    ))
}

/// Check if a path looks like a model bundle
pub fn is_valid_bundle(path: &Path) -> bool {
    path.is_dir() && path.join(MODEL_META_FILE).exists() && path.join(MODEL_FILE).exists()
}

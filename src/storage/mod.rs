//! On-disk persistence for samples and trained models

pub mod model_bundle;
pub mod repository;

pub use model_bundle::{is_valid_bundle, read_model, write_model, ModelMeta};
pub use repository::{
    JsonFileRepository, MemoryRepository, PersistError, SampleRepository, StorageMeta,
};

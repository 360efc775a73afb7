//! Training sample storage

pub mod store;

pub use store::{
    LabelSamples, LabelSummary, SampleStore, StoreError, StoreSnapshot, TARGET_SAMPLES_PER_LABEL,
};

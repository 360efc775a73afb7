//! Classifier training
//!
//! Dataset assembly, the backend boundary and the background pipeline that
//! runs a backend and installs what it produces.

pub mod classifier;
pub mod dataset;
pub mod pipeline;
pub mod softmax;
pub mod types;

pub use classifier::{
    BackendError, ClassifierBackend, ClassifierModel, ClassifierSlot, FitRequest, TrainedClassifier,
};
pub use dataset::{TrainingExample, TrainingSet};
pub use pipeline::{TrainingPipeline, TrainingRun};
pub use softmax::{SoftmaxBackend, SoftmaxModel};
pub use types::{
    EpochProgress, Hyperparameters, TrainingError, TrainingEvent, TrainingSummary, MIN_LABELS,
    MIN_SAMPLES_PER_LABEL,
};

//! Feature extraction
//!
//! Converts detector output into classifier input.

pub mod vectorizer;

pub use vectorizer::{FeatureLayout, FeatureVector, HandSelection, Vectorizer, HAND_BLOCK_LEN};

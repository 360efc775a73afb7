//! Hand detector boundary
//!
//! Observation types produced by the external keypoint detector, plus a
//! replay source for detector output captured to disk.

pub mod replay;
pub mod traits;

pub use replay::{CaptureError, JsonLinesReplay};
pub use traits::{
    FrameObservation, FrameSource, HandObservation, Handedness, Keypoint, TimedFrame,
    COORDS_PER_KEYPOINT, KEYPOINTS_PER_HAND,
};

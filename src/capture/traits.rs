//! Detector-facing types
//!
//! Shapes of the data produced by the per-frame hand detector, and the trait
//! hosts implement to feed frames into the workbench.

use serde::{Deserialize, Serialize};

/// Number of tracked keypoints per hand
pub const KEYPOINTS_PER_HAND: usize = 21;

/// Coordinates per keypoint (x, y, z)
pub const COORDS_PER_KEYPOINT: usize = 3;

/// One tracked skeletal point of a hand
///
/// `x` and `y` are normalized to the frame dimensions, `z` is relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The same point seen through a horizontally mirrored view
    pub fn mirrored(self) -> Self {
        Self {
            x: 1.0 - self.x,
            ..self
        }
    }
}

/// Which hand the detector believes it saw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// The other hand
    pub fn opposite(self) -> Self {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }

    /// Block position of this hand inside a two-hand feature vector
    pub fn slot(self) -> usize {
        match self {
            Handedness::Left => 0,
            Handedness::Right => 1,
        }
    }
}

/// A single detected hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub handedness: Handedness,

    /// Ordered keypoints, wrist first. Detectors report exactly 21.
    pub keypoints: Vec<Keypoint>,
}

impl HandObservation {
    pub fn new(handedness: Handedness, keypoints: Vec<Keypoint>) -> Self {
        Self {
            handedness,
            keypoints,
        }
    }

    /// A hand whose 21 keypoints all sit at the same position
    pub fn filled(handedness: Handedness, point: Keypoint) -> Self {
        Self::new(handedness, vec![point; KEYPOINTS_PER_HAND])
    }
}

/// Everything the detector reported for one video frame
///
/// Holds zero, one or two hands. The detector gives no ordering guarantee,
/// so consumers match hands by handedness, never by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    #[serde(default)]
    pub hands: Vec<HandObservation>,
}

impl FrameObservation {
    pub fn new(hands: Vec<HandObservation>) -> Self {
        Self { hands }
    }

    /// A frame in which no hand was detected
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    pub fn hand_count(&self) -> usize {
        self.hands.len()
    }
}

/// A frame observation stamped with its capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedFrame {
    /// Milliseconds since the start of the capture
    pub t_ms: u64,

    #[serde(flatten)]
    pub frame: FrameObservation,
}

/// Anything that can deliver detector output frame by frame
///
/// Camera acquisition and the keypoint model live behind this trait; the
/// workbench only ever sees the resulting observations.
pub trait FrameSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Option<Result<TimedFrame, Self::Error>>;
}

//! Landmark vectorization
//!
//! Turns one frame's hand keypoints into the fixed-length feature vector the
//! classifier consumes. Two-hand layouts always carry a Left block followed
//! by a Right block; a hand that is absent or filtered out by the
//! hand-selection mode contributes a zero-filled block, so the vector length
//! never depends on how many hands are visible.

use crate::capture::{
    FrameObservation, HandObservation, Handedness, COORDS_PER_KEYPOINT, KEYPOINTS_PER_HAND,
};
use serde::{Deserialize, Serialize};

/// Values contributed by one hand
pub const HAND_BLOCK_LEN: usize = KEYPOINTS_PER_HAND * COORDS_PER_KEYPOINT;

/// Which detected hands feed the feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandSelection {
    Left,
    Right,
    #[default]
    #[serde(alias = "all")]
    Both,
}

impl HandSelection {
    /// Whether a hand with this handedness contributes under this mode
    pub fn accepts(self, handedness: Handedness) -> bool {
        match self {
            HandSelection::Left => handedness == Handedness::Left,
            HandSelection::Right => handedness == Handedness::Right,
            HandSelection::Both => true,
        }
    }
}

/// Number of hand blocks in every feature vector
///
/// Fixed for the lifetime of a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureLayout {
    OneHand,
    #[default]
    TwoHands,
}

impl FeatureLayout {
    pub fn hand_slots(self) -> usize {
        match self {
            FeatureLayout::OneHand => 1,
            FeatureLayout::TwoHands => 2,
        }
    }

    pub fn vector_len(self) -> usize {
        HAND_BLOCK_LEN * self.hand_slots()
    }

    /// Whether a hand-selection mode can be expressed in this layout
    pub fn supports(self, selection: HandSelection) -> bool {
        !(self == FeatureLayout::OneHand && selection == HandSelection::Both)
    }
}

/// Numeric encoding of one frame's hand geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// First component that is NaN or infinite, with its position
    pub fn first_non_finite(&self) -> Option<(usize, f32)> {
        self.0
            .iter()
            .copied()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Stateless frame-to-vector encoder
#[derive(Debug, Clone, Copy)]
pub struct Vectorizer {
    layout: FeatureLayout,

    /// Detector output refers to an un-mirrored frame while the user sees a
    /// mirrored view; flip x and swap handedness so features match the view.
    mirror_input: bool,
}

impl Vectorizer {
    pub fn new(layout: FeatureLayout, mirror_input: bool) -> Self {
        Self {
            layout,
            mirror_input,
        }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn mirror_input(&self) -> bool {
        self.mirror_input
    }

    pub fn vector_len(&self) -> usize {
        self.layout.vector_len()
    }

    /// Encode a frame. Never fails; a frame without usable hands encodes to zeros.
    pub fn vectorize(&self, frame: &FrameObservation, selection: HandSelection) -> FeatureVector {
        let [left, right] = self.resolve_hands(frame);
        let mut values = Vec::with_capacity(self.vector_len());

        match self.layout {
            FeatureLayout::TwoHands => {
                let left = left.filter(|_| selection.accepts(Handedness::Left));
                let right = right.filter(|_| selection.accepts(Handedness::Right));
                self.push_block(&mut values, left);
                self.push_block(&mut values, right);
            }
            FeatureLayout::OneHand => {
                let hand = match selection {
                    HandSelection::Left => left,
                    HandSelection::Right => right,
                    HandSelection::Both => left.or(right),
                };
                self.push_block(&mut values, hand);
            }
        }

        FeatureVector(values)
    }

    /// Encode a frame only if it holds a hand the selection mode accepts
    ///
    /// This is the "valid frame" predicate shared by recording and recognition.
    pub fn qualifying_features(
        &self,
        frame: &FrameObservation,
        selection: HandSelection,
    ) -> Option<FeatureVector> {
        self.has_qualifying_hand(frame, selection)
            .then(|| self.vectorize(frame, selection))
    }

    pub fn has_qualifying_hand(&self, frame: &FrameObservation, selection: HandSelection) -> bool {
        frame
            .hands
            .iter()
            .any(|hand| selection.accepts(self.view_handedness(hand.handedness)))
    }

    /// Handedness as seen in the consuming view
    fn view_handedness(&self, reported: Handedness) -> Handedness {
        if self.mirror_input {
            reported.opposite()
        } else {
            reported
        }
    }

    /// Place detected hands into [left, right] slots by view handedness
    fn resolve_hands<'a>(&self, frame: &'a FrameObservation) -> [Option<&'a HandObservation>; 2] {
        let mut slots: [Option<&HandObservation>; 2] = [None, None];
        for hand in &frame.hands {
            let handedness = self.view_handedness(hand.handedness);
            let slot = &mut slots[handedness.slot()];
            if slot.is_some() {
                tracing::debug!("Ignoring duplicate {:?} hand in frame", handedness);
                continue;
            }
            *slot = Some(hand);
        }
        slots
    }

    fn push_block(&self, values: &mut Vec<f32>, hand: Option<&HandObservation>) {
        let Some(hand) = hand else {
            values.extend(std::iter::repeat(0.0).take(HAND_BLOCK_LEN));
            return;
        };

        for index in 0..KEYPOINTS_PER_HAND {
            match hand.keypoints.get(index) {
                Some(&point) => {
                    let point = if self.mirror_input {
                        point.mirrored()
                    } else {
                        point
                    };
                    values.extend([sanitize(point.x), sanitize(point.y), sanitize(point.z)]);
                }
                None => values.extend([0.0; COORDS_PER_KEYPOINT]),
            }
        }
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

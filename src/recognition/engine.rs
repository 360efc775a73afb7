//! Hold-to-confirm recognition
//!
//! Turns per-frame classifier scores into discrete symbols. A label must be
//! predicted continuously for the hold threshold before it is emitted, and
//! one continuous hold emits once.

use crate::features::FeatureVector;
use crate::training::TrainedClassifier;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A symbol confirmed by holding the same prediction long enough
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedSymbol {
    pub label: String,
    pub confidence: f32,
}

/// The winning class of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
}

/// Index and value of the strict maximum, first index winning ties
///
/// NaN scores never win; `None` when every score is NaN or the slice is empty.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best
}

/// Run the classifier on one vector and pick the winning label
///
/// Backend failures and malformed score vectors yield `None`.
pub fn predict(classifier: &TrainedClassifier, features: &FeatureVector) -> Option<Prediction> {
    let scores = match classifier.predict(features) {
        Ok(scores) => scores,
        Err(e) => {
            tracing::warn!("Prediction skipped: {}", e);
            return None;
        }
    };
    if scores.len() != classifier.labels.len() {
        tracing::warn!(
            "Prediction skipped: {} scores for {} labels",
            scores.len(),
            classifier.labels.len()
        );
        return None;
    }

    let (class_index, confidence) = argmax(&scores)?;
    Some(Prediction {
        class_index,
        label: classifier.labels[class_index].clone(),
        confidence,
    })
}

/// Candidate tracking across frames
#[derive(Debug, Clone, Default)]
pub struct RecognitionEngine {
    candidate: Option<String>,
    since: Option<Instant>,
}

impl RecognitionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label currently being held
    pub fn candidate(&self) -> Option<&str> {
        self.candidate.as_deref()
    }

    /// When the current hold started; cleared after an emission
    pub fn candidate_since(&self) -> Option<Instant> {
        self.since
    }

    pub fn reset(&mut self) {
        self.candidate = None;
        self.since = None;
    }

    /// Feed one frame's qualifying features (`None` when no hand qualifies)
    pub fn observe(
        &mut self,
        features: Option<&FeatureVector>,
        classifier: &TrainedClassifier,
        hold: Duration,
        now: Instant,
    ) -> Option<ConfirmedSymbol> {
        let Some(features) = features else {
            if self.candidate.is_some() {
                tracing::debug!("Hand lost, resetting candidate");
            }
            self.reset();
            return None;
        };

        let prediction = predict(classifier, features)?;
        self.advance(prediction, hold, now)
    }

    /// Apply one prediction to the hold state
    pub fn advance(
        &mut self,
        prediction: Prediction,
        hold: Duration,
        now: Instant,
    ) -> Option<ConfirmedSymbol> {
        if self.candidate.as_deref() != Some(prediction.label.as_str()) {
            tracing::debug!("New candidate '{}'", prediction.label);
            self.candidate = Some(prediction.label);
            self.since = Some(now);
            return None;
        }

        let since = self.since?;
        if now.saturating_duration_since(since) < hold {
            return None;
        }

        self.since = None;
        tracing::info!(
            "Confirmed '{}' ({:.2})",
            prediction.label,
            prediction.confidence
        );
        Some(ConfirmedSymbol {
            label: prediction.label,
            confidence: prediction.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureLayout;
    use crate::training::classifier::testing::{BrokenModel, FixedModel};

    fn classifier(scores: Vec<f32>) -> TrainedClassifier {
        let labels = ["A", "B", "C"][..scores.len()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        TrainedClassifier::new(labels, FeatureLayout::TwoHands, Box::new(FixedModel { scores }))
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_argmax_first_index_wins_ties() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Some((0, 0.4)));
        assert_eq!(argmax(&[0.1, 0.5, 0.5]), Some((1, 0.5)));
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some((1, 0.2)));
        assert_eq!(argmax(&[f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_hold_emits_exactly_once() {
        let classifier = classifier(vec![0.9, 0.1]);
        let features = FeatureVector::zeros(126);
        let mut engine = RecognitionEngine::new();
        let start = Instant::now();

        let emitted: Vec<_> = (0..=6)
            .filter_map(|step| {
                engine.observe(Some(&features), &classifier, ms(500), start + ms(step * 100))
            })
            .collect();

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].label, "A");
        assert!((emitted[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_zero_hand_frame_resets_hold() {
        let classifier = classifier(vec![0.9, 0.1]);
        let features = FeatureVector::zeros(126);
        let mut engine = RecognitionEngine::new();
        let start = Instant::now();

        for step in 0..=4 {
            assert!(engine
                .observe(Some(&features), &classifier, ms(500), start + ms(step * 100))
                .is_none());
        }
        assert!(engine.observe(None, &classifier, ms(500), start + ms(450)).is_none());
        assert_eq!(engine.candidate(), None);

        // A fresh 500 ms is needed after the reset
        for step in 5..=9 {
            assert!(engine
                .observe(Some(&features), &classifier, ms(500), start + ms(step * 100))
                .is_none());
        }
        assert!(engine
            .observe(Some(&features), &classifier, ms(500), start + ms(1000))
            .is_some());
    }

    #[test]
    fn test_changing_label_restarts_timer() {
        let mut engine = RecognitionEngine::new();
        let start = Instant::now();
        let a = Prediction {
            class_index: 0,
            label: "A".to_string(),
            confidence: 0.8,
        };
        let b = Prediction {
            class_index: 1,
            label: "B".to_string(),
            confidence: 0.7,
        };

        assert!(engine.advance(a.clone(), ms(300), start).is_none());
        assert!(engine.advance(b.clone(), ms(300), start + ms(200)).is_none());
        assert!(engine.advance(b.clone(), ms(300), start + ms(400)).is_none());
        assert_eq!(engine.advance(b, ms(300), start + ms(500)).unwrap().label, "B");
        assert!(engine.advance(a, ms(300), start + ms(600)).is_none());
        assert_eq!(engine.candidate(), Some("A"));
    }

    #[test]
    fn test_predict_failure_leaves_state_untouched() {
        let good = classifier(vec![0.9, 0.1]);
        let broken = TrainedClassifier::new(
            vec!["A".to_string(), "B".to_string()],
            FeatureLayout::TwoHands,
            Box::new(BrokenModel),
        );
        let features = FeatureVector::zeros(126);
        let mut engine = RecognitionEngine::new();
        let start = Instant::now();

        engine.observe(Some(&features), &good, ms(500), start);
        assert!(engine
            .observe(Some(&features), &broken, ms(500), start + ms(300))
            .is_none());
        assert_eq!(engine.candidate(), Some("A"));
        assert_eq!(engine.candidate_since(), Some(start));
        assert!(engine
            .observe(Some(&features), &good, ms(500), start + ms(500))
            .is_some());
    }

    #[test]
    fn test_mismatched_score_length_is_no_prediction() {
        let classifier = TrainedClassifier::new(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            FeatureLayout::TwoHands,
            Box::new(FixedModel {
                scores: vec![1.0, 0.0],
            }),
        );
        assert!(predict(&classifier, &FeatureVector::zeros(126)).is_none());
    }
}

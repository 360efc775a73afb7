//! Recording controller
//!
//! Decides when captured feature vectors are appended to the sample store.
//! Ticks are driven by the caller's frame loop: every frame calls `tick`
//! with the latest qualifying vector, and a sample is taken when the
//! session's cadence slot is due.

use super::state::{
    RecorderState, RecordingConfig, RecordingSession, SessionKind, SessionSummary, StopReason,
};
use crate::features::FeatureVector;
use crate::samples::{SampleStore, StoreError};
use crate::storage::SampleRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Recording errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordingError {
    #[error("No hand detected, show a hand to the camera first")]
    NoActiveFrame,

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Recording cadence must be greater than zero")]
    InvalidCadence,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Events emitted while recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RecordingEvent {
    /// A session was armed
    Started {
        session_id: Uuid,
        label: String,
        state: RecorderState,
    },
    /// A sample was appended; `count` is the label's new total
    Captured { label: String, count: usize },
    /// A tick fired without a qualifying hand
    NoHandDetected { label: String },
    /// The session ended
    Stopped(SessionSummary),
}

/// What a single `tick` call did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No session armed
    Idle,
    /// Armed, but no slot was due
    Waiting,
    /// A sample was appended; `count` is the label's new total
    Captured { count: usize },
    /// A slot was due but no hand was present
    Skipped,
    /// The store refused the vector and the session was stopped
    Rejected(StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,

    /// Set when the session ended during this tick
    pub finished: Option<SessionSummary>,
}

impl TickReport {
    fn idle() -> Self {
        Self {
            outcome: TickOutcome::Idle,
            finished: None,
        }
    }
}

/// Drives recording sessions against a sample store
pub struct RecordingController {
    /// Armed session, if any
    session: Option<RecordingSession>,

    /// Durable storage, written after every append
    repository: Arc<dyn SampleRepository>,

    /// Event broadcaster
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingController {
    pub fn new(repository: Arc<dyn SampleRepository>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            session: None,
            repository,
            event_tx,
        }
    }

    /// Get the current recording state
    pub fn state(&self) -> RecorderState {
        self.session
            .as_ref()
            .map(RecordingSession::state)
            .unwrap_or(RecorderState::Idle)
    }

    pub fn is_armed(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn active_label(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.label.as_str())
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Arm a session that captures until `config.duration()` has passed
    pub fn start_timed(
        &mut self,
        store: &SampleStore,
        label: &str,
        config: &RecordingConfig,
        latest: Option<&FeatureVector>,
        now: Instant,
    ) -> Result<Uuid, RecordingError> {
        let kind = SessionKind::Timed {
            deadline: now + config.duration(),
        };
        self.start(store, label, kind, config.cadence(), latest, now)
    }

    /// Arm a session that captures until stopped
    pub fn start_held(
        &mut self,
        store: &SampleStore,
        label: &str,
        cadence: Duration,
        latest: Option<&FeatureVector>,
        now: Instant,
    ) -> Result<Uuid, RecordingError> {
        self.start(store, label, SessionKind::Held, cadence, latest, now)
    }

    fn start(
        &mut self,
        store: &SampleStore,
        label: &str,
        kind: SessionKind,
        cadence: Duration,
        latest: Option<&FeatureVector>,
        now: Instant,
    ) -> Result<Uuid, RecordingError> {
        let label = label.trim();
        if !store.contains(label) {
            return Err(RecordingError::UnknownLabel(label.to_string()));
        }
        if cadence.is_zero() {
            return Err(RecordingError::InvalidCadence);
        }

        // Last writer wins, even when the new session then finds no hand
        self.finish(StopReason::Superseded);
        if latest.is_none() {
            return Err(RecordingError::NoActiveFrame);
        }

        let session = RecordingSession::new(label.to_string(), kind, cadence, now);
        let session_id = session.id;
        let state = session.state();

        tracing::info!(
            "Recording '{}' ({:?}, every {:?}, session {})",
            label,
            state,
            cadence,
            session_id
        );
        self.session = Some(session);
        let _ = self.event_tx.send(RecordingEvent::Started {
            session_id,
            label: label.to_string(),
            state,
        });
        Ok(session_id)
    }

    /// Stop the armed session
    pub fn stop(&mut self) -> Option<SessionSummary> {
        self.finish(StopReason::Manual)
    }

    /// Stop the session if it records into `label`
    pub fn label_removed(&mut self, label: &str) -> Option<SessionSummary> {
        if self.active_label() == Some(label.trim()) {
            return self.finish(StopReason::LabelRemoved);
        }
        None
    }

    /// Append one sample without arming a session
    pub fn capture_one(
        &self,
        store: &mut SampleStore,
        label: &str,
        latest: Option<&FeatureVector>,
    ) -> Result<usize, RecordingError> {
        let label = label.trim();
        if !store.contains(label) {
            return Err(RecordingError::UnknownLabel(label.to_string()));
        }
        let features = latest.ok_or(RecordingError::NoActiveFrame)?;

        let count = store.append_sample(label, features.clone())?;
        tracing::debug!("Captured sample #{} for '{}'", count, label);
        self.persist(store);
        let _ = self.event_tx.send(RecordingEvent::Captured {
            label: label.to_string(),
            count,
        });
        Ok(count)
    }

    /// Advance the armed session to `now`
    ///
    /// Takes at most one sample per call. A timed session is stopped once its
    /// deadline has passed, after any tick due at the same instant.
    pub fn tick(
        &mut self,
        store: &mut SampleStore,
        latest: Option<&FeatureVector>,
        now: Instant,
    ) -> TickReport {
        let Some(session) = self.session.as_mut() else {
            return TickReport::idle();
        };

        let outcome = if session.tick_due(now) {
            session.reschedule(now);
            match latest {
                Some(features) => match store.append_sample(&session.label, features.clone()) {
                    Ok(count) => {
                        session.captured += 1;
                        tracing::debug!("Captured sample #{} for '{}'", count, session.label);
                        let _ = self.event_tx.send(RecordingEvent::Captured {
                            label: session.label.clone(),
                            count,
                        });
                        TickOutcome::Captured { count }
                    }
                    Err(e) => TickOutcome::Rejected(e),
                },
                None => {
                    session.skipped += 1;
                    tracing::warn!("No hand detected for '{}', tick skipped", session.label);
                    let _ = self.event_tx.send(RecordingEvent::NoHandDetected {
                        label: session.label.clone(),
                    });
                    TickOutcome::Skipped
                }
            }
        } else {
            TickOutcome::Waiting
        };

        let expired = session.is_expired(now);
        if matches!(outcome, TickOutcome::Captured { .. }) {
            self.persist(store);
        }

        let finished = match &outcome {
            TickOutcome::Rejected(e) => {
                tracing::warn!("Sample store rejected captured vector: {}", e);
                self.finish(StopReason::StoreRejected)
            }
            _ if expired => self.finish(StopReason::DeadlineReached),
            _ => None,
        };

        TickReport { outcome, finished }
    }

    fn finish(&mut self, reason: StopReason) -> Option<SessionSummary> {
        let session = self.session.take()?;
        let summary = session.summary(reason);

        tracing::info!(
            "Recording '{}' stopped ({:?}): {} captured, {} skipped",
            summary.label,
            reason,
            summary.captured,
            summary.skipped
        );
        let _ = self.event_tx.send(RecordingEvent::Stopped(summary.clone()));
        Some(summary)
    }

    fn persist(&self, store: &SampleStore) {
        if let Err(e) = self.repository.persist(&store.snapshot()) {
            tracing::warn!("Failed to persist samples: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRepository;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn features() -> FeatureVector {
        let mut values = vec![0.0; 126];
        values[0] = 0.5;
        FeatureVector::from(values)
    }

    fn setup() -> (RecordingController, SampleStore, Arc<MemoryRepository>) {
        let repository = Arc::new(MemoryRepository::new());
        let controller = RecordingController::new(repository.clone());
        let mut store = SampleStore::default();
        store.add_label("A").unwrap();
        store.add_label("B").unwrap();
        (controller, store, repository)
    }

    #[test]
    fn test_start_requires_active_frame() {
        let (mut controller, store, _) = setup();
        let config = RecordingConfig::default();

        assert_eq!(
            controller.start_timed(&store, "A", &config, None, Instant::now()),
            Err(RecordingError::NoActiveFrame)
        );
        assert_eq!(controller.state(), RecorderState::Idle);
    }

    #[test]
    fn test_start_rejects_unknown_label_and_zero_cadence() {
        let (mut controller, store, _) = setup();
        let now = Instant::now();
        let f = features();

        assert_eq!(
            controller.start_held(&store, "missing", ms(100), Some(&f), now),
            Err(RecordingError::UnknownLabel("missing".to_string()))
        );
        assert_eq!(
            controller.start_held(&store, "A", Duration::ZERO, Some(&f), now),
            Err(RecordingError::InvalidCadence)
        );
    }

    #[test]
    fn test_rejected_start_keeps_armed_session() {
        let (mut controller, store, _) = setup();
        let mut events = controller.subscribe();
        let now = Instant::now();
        let f = features();
        let session_id = controller.start_held(&store, "A", ms(100), Some(&f), now).unwrap();

        assert_eq!(
            controller.start_held(&store, "missing", ms(100), Some(&f), now),
            Err(RecordingError::UnknownLabel("missing".to_string()))
        );
        assert_eq!(
            controller.start_timed(
                &store,
                "B",
                &RecordingConfig {
                    cadence_ms: 0,
                    duration_ms: 500
                },
                Some(&f),
                now
            ),
            Err(RecordingError::InvalidCadence)
        );

        assert_eq!(controller.state(), RecorderState::ArmedHeld);
        assert_eq!(controller.session().unwrap().id, session_id);
        assert!(matches!(events.try_recv().unwrap(), RecordingEvent::Started { .. }));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_start_without_hand_still_stops_previous_session() {
        let (mut controller, store, _) = setup();
        let now = Instant::now();
        let f = features();
        controller.start_held(&store, "A", ms(100), Some(&f), now).unwrap();

        assert_eq!(
            controller.start_held(&store, "B", ms(100), None, now),
            Err(RecordingError::NoActiveFrame)
        );
        assert_eq!(controller.state(), RecorderState::Idle);
    }

    #[test]
    fn test_padded_label_names_resolve() {
        let (mut controller, mut store, _) = setup();
        let f = features();

        assert_eq!(controller.capture_one(&mut store, " A ", Some(&f)), Ok(1));
        controller.start_held(&store, " B", ms(100), Some(&f), Instant::now()).unwrap();
        assert_eq!(controller.active_label(), Some("B"));
        assert_eq!(controller.label_removed("B ").unwrap().reason, StopReason::LabelRemoved);
    }

    #[test]
    fn test_timed_session_stops_at_deadline() {
        let (mut controller, mut store, repository) = setup();
        let config = RecordingConfig {
            cadence_ms: 100,
            duration_ms: 500,
        };
        let start = Instant::now();
        let f = features();
        controller.start_timed(&store, "A", &config, Some(&f), start).unwrap();
        assert_eq!(controller.state(), RecorderState::ArmedTimed);

        let mut finished = None;
        for step in 1..=8 {
            let report = controller.tick(&mut store, Some(&f), start + ms(step * 100));
            if let Some(summary) = report.finished {
                finished = Some((step, summary));
                break;
            }
        }

        let (step, summary) = finished.unwrap();
        assert_eq!(step, 5);
        assert_eq!(summary.reason, StopReason::DeadlineReached);
        assert_eq!(summary.captured, 5);
        assert_eq!(store.sample_count("A").unwrap(), 5);
        assert_eq!(repository.persist_count(), 5);
        assert_eq!(controller.state(), RecorderState::Idle);
    }

    #[test]
    fn test_held_session_runs_until_stopped() {
        let (mut controller, mut store, _) = setup();
        let start = Instant::now();
        let f = features();
        controller.start_held(&store, "B", ms(100), Some(&f), start).unwrap();

        for step in 1..=20 {
            let report = controller.tick(&mut store, Some(&f), start + ms(step * 100));
            assert!(report.finished.is_none());
        }
        let summary = controller.stop().unwrap();

        assert_eq!(summary.reason, StopReason::Manual);
        assert_eq!(store.sample_count("B").unwrap(), 20);
        assert!(controller.stop().is_none());
    }

    #[test]
    fn test_ticks_without_hand_are_skipped_with_event() {
        let (mut controller, mut store, _) = setup();
        let mut events = controller.subscribe();
        let start = Instant::now();
        let f = features();
        controller.start_held(&store, "A", ms(100), Some(&f), start).unwrap();

        let report = controller.tick(&mut store, None, start + ms(100));
        assert_eq!(report.outcome, TickOutcome::Skipped);
        assert_eq!(store.sample_count("A").unwrap(), 0);

        assert!(matches!(events.try_recv().unwrap(), RecordingEvent::Started { .. }));
        assert_eq!(
            events.try_recv().unwrap(),
            RecordingEvent::NoHandDetected {
                label: "A".to_string()
            }
        );
    }

    #[test]
    fn test_frames_between_slots_do_not_capture() {
        let (mut controller, mut store, _) = setup();
        let start = Instant::now();
        let f = features();
        controller.start_held(&store, "A", ms(100), Some(&f), start).unwrap();

        // 30 fps frame loop over 300 ms
        for step in 1..=9 {
            controller.tick(&mut store, Some(&f), start + ms(step * 33));
        }
        assert_eq!(store.sample_count("A").unwrap(), 2);

        // A long stall is not replayed
        let report = controller.tick(&mut store, Some(&f), start + ms(1000));
        assert_eq!(report.outcome, TickOutcome::Captured { count: 3 });
        assert_eq!(controller.tick(&mut store, Some(&f), start + ms(1050)).outcome, TickOutcome::Waiting);
    }

    #[test]
    fn test_label_removal_stops_session() {
        let (mut controller, store, _) = setup();
        let f = features();
        controller.start_held(&store, "A", ms(100), Some(&f), Instant::now()).unwrap();

        assert!(controller.label_removed("B").is_none());
        let summary = controller.label_removed("A").unwrap();
        assert_eq!(summary.reason, StopReason::LabelRemoved);
        assert!(!controller.is_armed());
    }

    #[test]
    fn test_new_session_supersedes_old() {
        let (mut controller, store, _) = setup();
        let mut events = controller.subscribe();
        let f = features();
        let now = Instant::now();
        controller.start_held(&store, "A", ms(100), Some(&f), now).unwrap();
        controller.start_held(&store, "B", ms(100), Some(&f), now).unwrap();

        assert_eq!(controller.active_label(), Some("B"));
        let _started = events.try_recv().unwrap();
        match events.try_recv().unwrap() {
            RecordingEvent::Stopped(summary) => {
                assert_eq!(summary.label, "A");
                assert_eq!(summary.reason, StopReason::Superseded);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_store_rejection_stops_session() {
        let (mut controller, mut store, _) = setup();
        let start = Instant::now();
        let f = features();
        controller.start_held(&store, "A", ms(100), Some(&f), start).unwrap();

        let short = FeatureVector::zeros(63);
        let report = controller.tick(&mut store, Some(&short), start + ms(100));

        assert!(matches!(report.outcome, TickOutcome::Rejected(StoreError::SizeMismatch { .. })));
        assert_eq!(report.finished.unwrap().reason, StopReason::StoreRejected);
        assert!(!controller.is_armed());
    }

    #[test]
    fn test_capture_one_persists_and_tolerates_storage_failure() {
        let (controller, mut store, repository) = setup();
        let f = features();

        assert_eq!(controller.capture_one(&mut store, "A", None), Err(RecordingError::NoActiveFrame));
        assert_eq!(controller.capture_one(&mut store, "A", Some(&f)), Ok(1));
        assert_eq!(repository.persist_count(), 1);

        repository.set_failing(true);
        assert_eq!(controller.capture_one(&mut store, "A", Some(&f)), Ok(2));
        assert_eq!(repository.persist_count(), 1);
        assert_eq!(store.sample_count("A").unwrap(), 2);
    }
}

//! Recording state management
//!
//! Defines the sample-recording state machine and session tracking.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Current state of the recording controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderState {
    /// No session armed
    #[default]
    Idle,
    /// Capturing until a deadline
    ArmedTimed,
    /// Capturing until stopped
    ArmedHeld,
}

/// How an armed session ends on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Timed { deadline: Instant },
    Held,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// `stop()` was called
    Manual,
    /// The timed session's duration elapsed
    DeadlineReached,
    /// The session's label was deleted
    LabelRemoved,
    /// A new session was started over this one
    Superseded,
    /// The sample store refused a captured vector
    StoreRejected,
}

/// An armed recording session
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub id: Uuid,
    pub label: String,
    pub kind: SessionKind,
    pub cadence: Duration,

    /// When the next tick is due
    pub next_tick: Instant,

    /// Samples appended by this session
    pub captured: usize,

    /// Ticks skipped because no hand was present
    pub skipped: usize,

    /// Unix timestamp when the session started
    pub unix_start_ms: u64,
}

impl RecordingSession {
    /// Create a session starting at `now`; the first tick fires one cadence later
    pub fn new(label: String, kind: SessionKind, cadence: Duration, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            label,
            kind,
            cadence,
            next_tick: now + cadence,
            captured: 0,
            skipped: 0,
            unix_start_ms: Utc::now().timestamp_millis() as u64,
        }
    }

    pub fn state(&self) -> RecorderState {
        match self.kind {
            SessionKind::Timed { .. } => RecorderState::ArmedTimed,
            SessionKind::Held => RecorderState::ArmedHeld,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.kind {
            SessionKind::Timed { deadline } => Some(deadline),
            SessionKind::Held => None,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Whether a tick is due at `now`
    pub fn tick_due(&self, now: Instant) -> bool {
        now >= self.next_tick && self.deadline().map_or(true, |deadline| self.next_tick <= deadline)
    }

    /// Move `next_tick` one cadence past the slot that just fired, skipping
    /// any slots that are already overdue
    pub fn reschedule(&mut self, now: Instant) {
        self.next_tick += self.cadence;
        if self.next_tick <= now {
            let cadence = self.cadence.as_nanos().max(1);
            let overdue = (now - self.next_tick).as_nanos() / cadence + 1;
            let skip = u64::try_from(overdue * cadence).unwrap_or(u64::MAX);
            self.next_tick += Duration::from_nanos(skip);
        }
    }

    pub fn summary(&self, reason: StopReason) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            label: self.label.clone(),
            captured: self.captured,
            skipped: self.skipped,
            reason,
            unix_start_ms: self.unix_start_ms,
            unix_end_ms: Utc::now().timestamp_millis() as u64,
        }
    }
}

/// Result of an ended session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub label: String,
    pub captured: usize,
    pub skipped: usize,
    pub reason: StopReason,
    pub unix_start_ms: u64,
    pub unix_end_ms: u64,
}

/// Cadence and duration for recording sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingConfig {
    /// Interval between captured samples
    pub cadence_ms: u64,

    /// Length of a timed session
    pub duration_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 100,
            duration_ms: 5000,
        }
    }
}

impl RecordingConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_session_stops_ticking_past_deadline() {
        let start = Instant::now();
        let session = RecordingSession::new(
            "A".to_string(),
            SessionKind::Timed {
                deadline: start + Duration::from_millis(250),
            },
            Duration::from_millis(100),
            start,
        );

        assert_eq!(session.state(), RecorderState::ArmedTimed);
        assert!(!session.tick_due(start + Duration::from_millis(50)));
        assert!(session.tick_due(start + Duration::from_millis(100)));
        assert!(!session.is_expired(start + Duration::from_millis(249)));
        assert!(session.is_expired(start + Duration::from_millis(250)));
    }

    #[test]
    fn test_reschedule_skips_overdue_slots() {
        let start = Instant::now();
        let mut session = RecordingSession::new(
            "A".to_string(),
            SessionKind::Held,
            Duration::from_millis(100),
            start,
        );

        // A late frame at 350 ms fires the 100 ms slot; 200 and 300 are dropped
        session.reschedule(start + Duration::from_millis(350));
        assert_eq!(session.next_tick, start + Duration::from_millis(400));
    }

    #[test]
    fn test_reschedule_after_long_stall_lands_on_next_slot() {
        let start = Instant::now();
        let mut session = RecordingSession::new(
            "A".to_string(),
            SessionKind::Held,
            Duration::from_micros(1),
            start,
        );

        // An hour at 1 us is billions of slots
        session.reschedule(start + Duration::from_secs(3600));
        assert_eq!(
            session.next_tick,
            start + Duration::from_secs(3600) + Duration::from_micros(1)
        );

        // Landing exactly on a slot boundary moves past it
        let mut session = RecordingSession::new(
            "A".to_string(),
            SessionKind::Held,
            Duration::from_millis(100),
            start,
        );
        session.reschedule(start + Duration::from_millis(300));
        assert_eq!(session.next_tick, start + Duration::from_millis(400));
    }

    #[test]
    fn test_default_config_matches_capture_defaults() {
        let config = RecordingConfig::default();
        assert_eq!(config.cadence(), Duration::from_millis(100));
        assert_eq!(config.duration(), Duration::from_millis(5000));
    }
}

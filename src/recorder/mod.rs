//! Sample recording
//!
//! - RecordingController to arm timed and held sessions
//! - Recording state and session tracking

pub mod controller;
pub mod state;

pub use controller::{RecordingController, RecordingError, RecordingEvent, TickOutcome, TickReport};
pub use state::{RecorderState, RecordingConfig, RecordingSession, SessionSummary, StopReason};

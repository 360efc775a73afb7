//! Gesture Scribe - turn held hand gestures into text.
//!
//! Captures labeled hand-landmark samples, trains a classifier on them and
//! recognizes gestures continuously, writing each confirmed gesture's label
//! to a text stream. Hand detection and the classifier model are pluggable;
//! `Workbench` is the entry point that wires everything together.

pub mod capture;
pub mod config;
pub mod features;
pub mod recognition;
pub mod recorder;
pub mod samples;
pub mod storage;
pub mod training;
pub mod utils;
pub mod workbench;

pub use config::AppConfig;
pub use utils::{AppError, AppResult, ErrorResponse};
pub use workbench::{FrameReport, Workbench};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides the default filter. Calling this more than once is
/// harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesture_scribe=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

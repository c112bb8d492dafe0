//! Mood Tracker
//!
//! Samples a camera at a low fixed rate, classifies the facial emotion in each
//! frame and appends detections to a local CSV log. Daily statistics and a bar
//! chart are derived from that log on demand.
//!
//! # Module Structure
//!
//! - `ingest`: camera sources (synthetic, V4L2) and the `DeviceGuard`
//! - `detect`: emotion backends and startup backend selection
//! - `session`: the capture session state machine
//! - `log`: append-only detection log
//! - `summary`: daily aggregation
//! - `chart`: PNG bar chart rendering
//! - `config`: layered configuration (file, environment)
//!
//! Nothing here stores frames; a frame lives only for the tick that captured it.

pub mod chart;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod log;
pub mod session;
pub mod summary;

pub use chart::ChartRenderer;
pub use config::TrackerConfig;
pub use detect::{
    select_backend, select_configured_backend, BackendTag, Classification, Emotion,
    EmotionBackend, SelectedBackend,
};
pub use error::{MoodError, Result};
pub use frame::Frame;
pub use ingest::{CameraOpener, DeviceGuard, DeviceOpener, FrameSource};
pub use log::{DetectionLog, DetectionRecord};
pub use session::{
    ActiveSession, Clock, SessionController, SessionParams, SessionReport, SessionSnapshot,
    SessionStatus, StopReason, SystemClock, TickOutcome,
};
pub use summary::{summarize, summarize_log, DailyAggregate};

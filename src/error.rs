use thiserror::Error;

/// Error taxonomy for the capture, inference and logging pipeline.
///
/// Each variant maps to one recovery policy: device and capture errors end
/// a session, inference errors only skip a frame, backend initialization
/// errors are absorbed by fallback selection.
#[derive(Debug, Error)]
pub enum MoodError {
    #[error("camera device {index} unavailable: {reason}")]
    DeviceUnavailable { index: u32, reason: String },

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("emotion inference failed: {0}")]
    Inference(String),

    #[error("backend initialization failed: {0}")]
    BackendInit(String),

    #[error("a capture session is already active")]
    SessionAlreadyActive,

    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f32),

    #[error("detection log error: {0}")]
    Log(String),

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MoodError {
    /// Problem domain, used to tell device faults from inference or logging faults.
    pub fn category(&self) -> &'static str {
        match self {
            MoodError::DeviceUnavailable { .. } => "device",
            MoodError::Capture(_) => "capture",
            MoodError::Inference(_) | MoodError::InvalidConfidence(_) => "inference",
            MoodError::BackendInit(_) => "backend",
            MoodError::SessionAlreadyActive => "session",
            MoodError::Log(_) => "log",
            MoodError::Chart(_) => "chart",
            MoodError::Io(_) => "io",
        }
    }

    /// Per-frame faults that the session loop recovers from.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            MoodError::Inference(_) | MoodError::InvalidConfidence(_)
        )
    }
}

impl From<csv::Error> for MoodError {
    fn from(err: csv::Error) -> Self {
        MoodError::Log(err.to_string())
    }
}

impl From<image::ImageError> for MoodError {
    fn from(err: image::ImageError) -> Self {
        MoodError::Chart(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MoodError>;

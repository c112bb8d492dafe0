use crate::detect::result::Classification;
use crate::error::Result;
use crate::frame::Frame;

/// Emotion inference backend trait.
///
/// # Contract
///
/// - "No face in frame" is a valid result: return `Ok(Classification::no_face())`.
/// - Return `MoodError::Inference` only for genuine faults (corrupt frame, model
///   failure). The session skips that frame and keeps running.
/// - Implementations must not retain the frame beyond the call.
pub trait EmotionBackend: Send {
    /// Backend identifier (e.g. "tract", "histogram").
    fn name(&self) -> &'static str;

    /// Classify the dominant facial emotion in a frame.
    fn classify(&mut self, frame: &Frame) -> Result<Classification>;

    /// Optional warm-up hook, run once during backend selection.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

mod backend;
mod backends;
mod result;
mod selector;

pub use backend::EmotionBackend;
pub use backends::HistogramBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{normalize_scores, softmax, Classification, Emotion, NO_FACE_LABEL};
pub use selector::{select_backend, select_configured_backend, BackendTag, SelectedBackend};

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::BackendSettings;
use crate::detect::backend::EmotionBackend;
use crate::detect::backends::HistogramBackend;
use crate::detect::result::Classification;
use crate::error::{MoodError, Result};
use crate::frame::Frame;

/// Which of the two backend variants the process runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTag {
    Primary,
    Fallback,
}

impl BackendTag {
    /// Identifier written to the `source` column of every detection record.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendTag::Primary => "primary",
            BackendTag::Fallback => "fallback",
        }
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend chosen at startup. Fixed for the process lifetime.
///
/// The backend sits behind `Arc<Mutex<_>>` because `classify` takes `&mut self`
/// and the session loop may run on a different thread than the one that built it.
#[derive(Clone)]
pub struct SelectedBackend {
    tag: BackendTag,
    name: &'static str,
    backend: Arc<Mutex<Box<dyn EmotionBackend>>>,
}

impl SelectedBackend {
    pub fn new(tag: BackendTag, backend: Box<dyn EmotionBackend>) -> Self {
        Self {
            tag,
            name: backend.name(),
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    pub fn tag(&self) -> BackendTag {
        self.tag
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Classify one frame, holding the backend lock only for this call.
    pub fn classify(&self, frame: &Frame) -> Result<Classification> {
        let mut guard = self
            .backend
            .lock()
            .map_err(|_| MoodError::Inference("backend lock poisoned".into()))?;
        guard.classify(frame)
    }
}

impl fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .finish()
    }
}

/// Try the primary constructor once; on any failure build the fallback instead.
///
/// Primary failures are logged and absorbed, never returned. Only a failing
/// fallback constructor surfaces an error.
pub fn select_backend<P, F>(primary: P, fallback: F) -> Result<SelectedBackend>
where
    P: FnOnce() -> Result<Box<dyn EmotionBackend>>,
    F: FnOnce() -> Result<Box<dyn EmotionBackend>>,
{
    let primary = primary().and_then(|mut backend| {
        backend.warm_up()?;
        Ok(backend)
    });

    match primary {
        Ok(backend) => {
            log::info!("emotion backend: {} (primary)", backend.name());
            Ok(SelectedBackend::new(BackendTag::Primary, backend))
        }
        Err(err) => {
            log::warn!(
                "primary emotion backend unavailable ({}); using fallback",
                err
            );
            let mut backend = fallback()?;
            backend.warm_up()?;
            log::info!("emotion backend: {} (fallback)", backend.name());
            Ok(SelectedBackend::new(BackendTag::Fallback, backend))
        }
    }
}

/// Select between the tract primary and the histogram fallback using configuration.
pub fn select_configured_backend(settings: &BackendSettings) -> Result<SelectedBackend> {
    let face_threshold = settings.face_threshold;
    select_backend(
        || build_primary(settings),
        || Ok(Box::new(HistogramBackend::new(face_threshold)) as Box<dyn EmotionBackend>),
    )
}

#[cfg(feature = "backend-tract")]
fn build_primary(settings: &BackendSettings) -> Result<Box<dyn EmotionBackend>> {
    let backend =
        crate::detect::backends::TractBackend::new(&settings.model_path, settings.face_threshold)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_primary(settings: &BackendSettings) -> Result<Box<dyn EmotionBackend>> {
    Err(MoodError::BackendInit(format!(
        "built without the backend-tract feature (model {})",
        settings.model_path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::Emotion;

    struct FixedBackend;

    impl EmotionBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn classify(&mut self, _frame: &Frame) -> Result<Classification> {
            Ok(Classification::face(Emotion::Happy, 0.9))
        }
    }

    struct ColdBackend;

    impl EmotionBackend for ColdBackend {
        fn name(&self) -> &'static str {
            "cold"
        }

        fn classify(&mut self, _frame: &Frame) -> Result<Classification> {
            Ok(Classification::no_face())
        }

        fn warm_up(&mut self) -> Result<()> {
            Err(MoodError::BackendInit("weights did not load".into()))
        }
    }

    #[test]
    fn prefers_primary_when_it_initializes() -> Result<()> {
        let selected = select_backend(
            || Ok(Box::new(FixedBackend) as Box<dyn EmotionBackend>),
            || Ok(Box::new(HistogramBackend::default()) as Box<dyn EmotionBackend>),
        )?;
        assert_eq!(selected.tag(), BackendTag::Primary);
        assert_eq!(selected.name(), "fixed");
        Ok(())
    }

    #[test]
    fn falls_back_when_primary_construction_fails() -> Result<()> {
        let selected = select_backend(
            || Err(MoodError::BackendInit("missing dependency".into())),
            || Ok(Box::new(HistogramBackend::default()) as Box<dyn EmotionBackend>),
        )?;
        assert_eq!(selected.tag(), BackendTag::Fallback);
        assert_eq!(selected.name(), "histogram");
        Ok(())
    }

    #[test]
    fn falls_back_when_primary_warm_up_fails() -> Result<()> {
        let selected = select_backend(
            || Ok(Box::new(ColdBackend) as Box<dyn EmotionBackend>),
            || Ok(Box::new(FixedBackend) as Box<dyn EmotionBackend>),
        )?;
        assert_eq!(selected.tag(), BackendTag::Fallback);
        let result = selected.classify(&Frame::solid(4, 4, [0, 0, 0]))?;
        assert_eq!(result.emotion, Some(Emotion::Happy));
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn configured_selection_without_tract_uses_fallback() -> Result<()> {
        let selected = select_configured_backend(&BackendSettings::default())?;
        assert_eq!(selected.tag(), BackendTag::Fallback);
        Ok(())
    }
}

#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context};
use tract_onnx::prelude::*;

use crate::detect::backend::EmotionBackend;
use crate::detect::result::{softmax, Classification, Emotion};
use crate::error::{MoodError, Result};
use crate::frame::{face_present, Frame, LumaStats};

/// Model input side (FER+ style 1x1x64x64 grayscale).
const INPUT_SIDE: usize = 64;

/// Output order of FER+ style models. Contempt folds into disgusted.
const OUTPUT_LABELS: [Emotion; 8] = [
    Emotion::Neutral,
    Emotion::Happy,
    Emotion::Surprised,
    Emotion::Sad,
    Emotion::Angry,
    Emotion::Disgusted,
    Emotion::Fearful,
    Emotion::Disgusted,
];

/// Tract-based primary backend for ONNX emotion models.
///
/// Loads a local model file once and runs inference on a grayscale center crop.
/// It performs no network I/O and writes nothing to disk.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    face_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, face_threshold: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        Self::load(model_path)
            .map(|model| Self {
                model,
                face_threshold,
            })
            .map_err(|err| MoodError::BackendInit(format!("{err:#}")))
    }

    fn load(model_path: &Path) -> anyhow::Result<TypedRunnableModel<TypedModel>> {
        if !model_path.is_file() {
            return Err(anyhow!("model file {} not found", model_path.display()));
        }
        tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 1, INPUT_SIDE, INPUT_SIDE)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }

    fn build_input(crop: &image::GrayImage) -> Tensor {
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 1, INPUT_SIDE, INPUT_SIDE),
            |(_, _, y, x)| crop.get_pixel(x as u32, y as u32)[0] as f32,
        );
        input.into_tensor()
    }

    fn extract_scores(outputs: TVec<TValue>) -> anyhow::Result<Vec<(Emotion, f32)>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let logits: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .cloned()
            .collect();
        if logits.len() != OUTPUT_LABELS.len() {
            return Err(anyhow!(
                "expected {} output logits, received {}",
                OUTPUT_LABELS.len(),
                logits.len()
            ));
        }

        let mut merged = [0f32; 7];
        for (label, prob) in OUTPUT_LABELS.iter().zip(softmax(&logits)) {
            merged[label.index()] += prob;
        }
        Ok(Emotion::ALL.iter().copied().zip(merged).collect())
    }
}

impl EmotionBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &Frame) -> Result<Classification> {
        let crop = frame.center_crop_luma(INPUT_SIDE as u32)?;
        if !face_present(&LumaStats::from_luma(&crop), self.face_threshold) {
            return Ok(Classification::no_face());
        }

        let input = Self::build_input(&crop);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|err| MoodError::Inference(format!("ONNX inference failed: {err:#}")))?;
        let scores =
            Self::extract_scores(outputs).map_err(|err| MoodError::Inference(format!("{err:#}")))?;
        Ok(Classification::from_scores(scores))
    }

    fn warm_up(&mut self) -> Result<()> {
        let probe = Frame::solid(INPUT_SIDE as u32, INPUT_SIDE as u32, [128, 128, 128]);
        let crop = probe.center_crop_luma(INPUT_SIDE as u32)?;
        self.model
            .run(tvec!(Self::build_input(&crop).into()))
            .map(|_| ())
            .map_err(|err| MoodError::BackendInit(format!("warm-up inference failed: {err:#}")))
    }
}

use crate::detect::backend::EmotionBackend;
use crate::detect::result::{softmax, Classification, Emotion};
use crate::error::Result;
use crate::frame::{face_present, Frame, LumaStats};

/// Side of the grayscale face crop the features are computed on.
const CROP_SIDE: u32 = 48;

/// Per-emotion linear weights over `[bias, mean, contrast, gradient, asymmetry]`.
/// Rows follow `Emotion::ALL`.
const WEIGHTS: [[f32; 5]; 7] = [
    [0.0, 2.0, 1.0, 0.5, -1.0],
    [0.2, -2.0, -0.5, -0.5, 0.0],
    [-0.3, -0.5, 1.5, -1.0, 1.0],
    [0.8, 0.0, -1.0, 0.0, -1.0],
    [-0.5, 1.0, 2.0, 1.0, 0.0],
    [-0.6, -1.0, 1.0, 0.5, 1.0],
    [-0.8, -0.5, 0.5, -0.5, 1.5],
];

/// Model-free fallback backend.
///
/// Always constructible. Scores each emotion from coarse luminance features of the
/// center crop with a fixed linear table, so results are deterministic per frame.
pub struct HistogramBackend {
    face_threshold: f32,
}

impl HistogramBackend {
    pub fn new(face_threshold: f32) -> Self {
        Self { face_threshold }
    }

    fn features(stats: &LumaStats) -> [f32; 5] {
        [
            1.0,
            stats.mean / 255.0,
            stats.std_dev / 128.0,
            stats.vertical_gradient / 255.0,
            stats.asymmetry / 128.0,
        ]
    }
}

impl Default for HistogramBackend {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FACE_THRESHOLD)
    }
}

impl EmotionBackend for HistogramBackend {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn classify(&mut self, frame: &Frame) -> Result<Classification> {
        let crop = frame.center_crop_luma(CROP_SIDE)?;
        let stats = LumaStats::from_luma(&crop);
        if !face_present(&stats, self.face_threshold) {
            return Ok(Classification::no_face());
        }

        let features = Self::features(&stats);
        let logits: Vec<f32> = WEIGHTS
            .iter()
            .map(|row| row.iter().zip(features.iter()).map(|(w, f)| w * f).sum())
            .collect();
        let probs = softmax(&logits);
        let scores = Emotion::ALL.iter().copied().zip(probs).collect();
        Ok(Classification::from_scores(scores))
    }
}

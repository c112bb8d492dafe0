use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MoodError, Result};

/// Emotion labels, in canonical chart order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Neutral,
    Surprised,
    Fearful,
    Disgusted,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Neutral,
        Emotion::Surprised,
        Emotion::Fearful,
        Emotion::Disgusted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Neutral => "neutral",
            Emotion::Surprised => "surprised",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
        }
    }

    /// Position in `Emotion::ALL`.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = String;

    /// Accepts canonical names and the labels common classifiers emit.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "happy" | "happiness" => Ok(Emotion::Happy),
            "sad" | "sadness" => Ok(Emotion::Sad),
            "angry" | "anger" => Ok(Emotion::Angry),
            "neutral" => Ok(Emotion::Neutral),
            "surprised" | "surprise" => Ok(Emotion::Surprised),
            "fearful" | "fear" | "scared" => Ok(Emotion::Fearful),
            "disgusted" | "disgust" | "contempt" => Ok(Emotion::Disgusted),
            other => Err(format!("unknown emotion label '{}'", other)),
        }
    }
}

/// Text used for "no face found" in logs and readouts.
pub const NO_FACE_LABEL: &str = "none";

/// Per-frame backend output.
///
/// `emotion == None` is the valid "no face in frame" result, not an error.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classification {
    pub emotion: Option<Emotion>,
    pub confidence: Option<f32>,
    /// Normalized score per emotion, summing to 1 when non-empty.
    pub scores: Vec<(Emotion, f32)>,
}

impl Classification {
    pub fn no_face() -> Self {
        Self::default()
    }

    pub fn face(emotion: Emotion, confidence: f32) -> Self {
        Self {
            emotion: Some(emotion),
            confidence: Some(confidence),
            scores: Vec::new(),
        }
    }

    /// Build from a score distribution; the dominant label wins, earliest on ties.
    pub fn from_scores(scores: Vec<(Emotion, f32)>) -> Self {
        let normalized = normalize_scores(scores);
        let mut best: Option<(Emotion, f32)> = None;
        for &(emotion, score) in &normalized {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((emotion, score)),
            }
        }
        match best {
            Some((emotion, score)) => Self {
                emotion: Some(emotion),
                confidence: Some(score),
                scores: normalized,
            },
            None => Self::no_face(),
        }
    }

    pub fn is_face(&self) -> bool {
        self.emotion.is_some()
    }

    /// Reject face results whose confidence is missing or outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.emotion.is_none() {
            return Ok(());
        }
        match self.confidence {
            Some(c) if c.is_finite() && (0.0..=1.0).contains(&c) => Ok(()),
            Some(c) => Err(MoodError::InvalidConfidence(c)),
            None => Err(MoodError::Inference(
                "face result without a confidence".into(),
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        self.emotion.map(|e| e.as_str()).unwrap_or(NO_FACE_LABEL)
    }
}

/// Drop non-finite and negative scores and rescale the rest to sum to 1.
pub fn normalize_scores(scores: Vec<(Emotion, f32)>) -> Vec<(Emotion, f32)> {
    let finite: Vec<(Emotion, f32)> = scores
        .into_iter()
        .filter(|(_, v)| v.is_finite() && *v >= 0.0)
        .collect();
    let total: f32 = finite.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    finite
        .into_iter()
        .map(|(emotion, v)| (emotion, v / total))
        .collect()
}

/// Numerically stable softmax over raw logits.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / total).collect()
}

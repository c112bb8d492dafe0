use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::detect::{Classification, Emotion, NO_FACE_LABEL};
use crate::error::{MoodError, Result};

/// Column order of the detection log.
pub const LOG_COLUMNS: [&str; 4] = ["timestamp", "emotion", "confidence", "source"];

/// One logged observation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub timestamp: DateTime<Utc>,
    /// `None` only for rows written by external tools with the `none` sentinel.
    pub emotion: Option<Emotion>,
    pub confidence: Option<f32>,
    pub source: String,
}

impl DetectionRecord {
    /// Build a record, rejecting confidences outside `[0, 1]`.
    pub fn new(
        timestamp: DateTime<Utc>,
        emotion: Option<Emotion>,
        confidence: Option<f32>,
        source: impl Into<String>,
    ) -> Result<Self> {
        if let Some(c) = confidence {
            if !c.is_finite() || !(0.0..=1.0).contains(&c) {
                return Err(MoodError::InvalidConfidence(c));
            }
        }
        let source = source.into();
        if source.trim().is_empty() || source.contains([',', '\n', '\r', '"']) {
            return Err(MoodError::Log(format!("invalid source identifier {:?}", source)));
        }
        Ok(Self {
            timestamp,
            emotion,
            confidence: if emotion.is_some() { confidence } else { None },
            source,
        })
    }

    /// Record for a face-found classification.
    pub fn from_classification(
        timestamp: DateTime<Utc>,
        classification: &Classification,
        source: &str,
    ) -> Result<Self> {
        classification.validate()?;
        Self::new(
            timestamp,
            classification.emotion,
            classification.confidence,
            source,
        )
    }

    pub fn label(&self) -> &'static str {
        self.emotion.map(|e| e.as_str()).unwrap_or(NO_FACE_LABEL)
    }

    pub(crate) fn to_row(&self) -> [String; 4] {
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.label().to_string(),
            self.confidence
                .map(|c| format!("{:.4}", c))
                .unwrap_or_default(),
            self.source.clone(),
        ]
    }

    pub(crate) fn from_row(row: &csv::StringRecord) -> Result<Self> {
        let field = |idx: usize| row.get(idx).map(str::trim).unwrap_or("");

        let timestamp = parse_timestamp(field(0))?;
        let emotion = match field(1) {
            "" => return Err(MoodError::Log("missing emotion".into())),
            label if label.eq_ignore_ascii_case(NO_FACE_LABEL) => None,
            label => Some(label.parse::<Emotion>().map_err(MoodError::Log)?),
        };
        let confidence = match field(2) {
            "" => None,
            raw => Some(
                raw.parse::<f32>()
                    .map_err(|_| MoodError::Log(format!("invalid confidence '{}'", raw)))?,
            ),
        };
        let source = match field(3) {
            "" => "unknown",
            s => s,
        };
        Self::new(timestamp, emotion, confidence, source)
    }
}

/// RFC 3339 timestamps, or naive ISO-8601 timestamps taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| MoodError::Log(format!("invalid timestamp '{}'", raw)))
}

//! Daily rollups over the detection log.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::detect::Emotion;
use crate::error::Result;
use crate::log::{read_records, DetectionRecord};

/// Statistics for one UTC calendar day. Derived on demand, never stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub dominant_emotion: Option<Emotion>,
    pub scan_count: usize,
    pub mean_confidence: Option<f32>,
    /// Records per emotion, in `Emotion::ALL` order.
    pub counts: Vec<(Emotion, usize)>,
}

impl DailyAggregate {
    /// The aggregate of a day without records.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            dominant_emotion: None,
            scan_count: 0,
            mean_confidence: None,
            counts: Emotion::ALL.iter().map(|&e| (e, 0)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scan_count == 0
    }

    pub fn count_of(&self, emotion: Emotion) -> usize {
        self.counts
            .iter()
            .find(|(e, _)| *e == emotion)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// Share of labelled records per emotion with a non-zero count.
    pub fn distribution(&self) -> Vec<(Emotion, f32)> {
        let labelled: usize = self.counts.iter().map(|(_, n)| n).sum();
        if labelled == 0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|&(e, n)| (e, n as f32 / labelled as f32))
            .collect()
    }
}

/// Summarize the records that fall on `day` (UTC).
///
/// The dominant emotion is the mode; ties go to the label that appeared first.
pub fn summarize<'a, I>(records: I, day: NaiveDate) -> DailyAggregate
where
    I: IntoIterator<Item = &'a DetectionRecord>,
{
    let mut aggregate = DailyAggregate::empty(day);
    let mut counts = [0usize; Emotion::ALL.len()];
    let mut first_seen = [usize::MAX; Emotion::ALL.len()];
    let mut confidence_sum = 0f64;
    let mut confidence_n = 0usize;

    for record in records
        .into_iter()
        .filter(|r| r.timestamp.date_naive() == day)
    {
        let position = aggregate.scan_count;
        aggregate.scan_count += 1;
        if let Some(emotion) = record.emotion {
            let idx = emotion.index();
            counts[idx] += 1;
            first_seen[idx] = first_seen[idx].min(position);
        }
        if let Some(c) = record.confidence {
            confidence_sum += c as f64;
            confidence_n += 1;
        }
    }

    aggregate.counts = Emotion::ALL
        .iter()
        .map(|&e| (e, counts[e.index()]))
        .collect();
    aggregate.dominant_emotion = Emotion::ALL
        .iter()
        .copied()
        .filter(|e| counts[e.index()] > 0)
        .max_by(|a, b| {
            counts[a.index()]
                .cmp(&counts[b.index()])
                .then(first_seen[b.index()].cmp(&first_seen[a.index()]))
        });
    if confidence_n > 0 {
        aggregate.mean_confidence = Some((confidence_sum / confidence_n as f64) as f32);
    }
    aggregate
}

/// Read the log at `path` and summarize `day`.
pub fn summarize_log(path: &Path, day: NaiveDate) -> Result<DailyAggregate> {
    let records = read_records(path)?;
    Ok(summarize(&records, day))
}

/// Today's UTC calendar date.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 2, hour, minute, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
    }

    fn rec(ts: DateTime<Utc>, emotion: Option<Emotion>, c: Option<f32>) -> DetectionRecord {
        DetectionRecord::new(ts, emotion, c, "primary").unwrap()
    }

    #[test]
    fn empty_day_is_a_placeholder_aggregate() {
        let aggregate = summarize(&[], day());
        assert_eq!(aggregate.scan_count, 0);
        assert_eq!(aggregate.dominant_emotion, None);
        assert_eq!(aggregate.mean_confidence, None);
        assert!(aggregate.distribution().is_empty());
        assert_eq!(aggregate, DailyAggregate::empty(day()));
    }

    #[test]
    fn exact_tie_goes_to_first_occurrence() {
        let records = vec![
            rec(at(9, 0), Some(Emotion::Happy), Some(0.5)),
            rec(at(9, 1), Some(Emotion::Sad), Some(0.5)),
            rec(at(9, 2), Some(Emotion::Happy), Some(0.5)),
            rec(at(9, 3), Some(Emotion::Sad), Some(0.5)),
        ];
        let aggregate = summarize(&records, day());
        assert_eq!(aggregate.dominant_emotion, Some(Emotion::Happy));
        assert_eq!(aggregate.count_of(Emotion::Sad), 2);
    }

    #[test]
    fn tie_break_ignores_canonical_order() {
        let records = vec![
            rec(at(9, 0), Some(Emotion::Disgusted), Some(0.5)),
            rec(at(9, 1), Some(Emotion::Happy), Some(0.5)),
        ];
        let aggregate = summarize(&records, day());
        assert_eq!(aggregate.dominant_emotion, Some(Emotion::Disgusted));
    }

    #[test]
    fn strictly_higher_count_wins() {
        let records = vec![
            rec(at(9, 0), Some(Emotion::Happy), Some(0.5)),
            rec(at(9, 1), Some(Emotion::Sad), Some(0.5)),
            rec(at(9, 2), Some(Emotion::Sad), Some(0.5)),
        ];
        assert_eq!(
            summarize(&records, day()).dominant_emotion,
            Some(Emotion::Sad)
        );
    }

    #[test]
    fn mean_confidence_skips_undefined_values() {
        let records = vec![
            rec(at(10, 0), Some(Emotion::Happy), Some(0.8)),
            rec(at(10, 1), Some(Emotion::Happy), Some(0.6)),
            rec(at(10, 2), None, None),
        ];
        let aggregate = summarize(&records, day());
        assert_eq!(aggregate.scan_count, 3);
        let mean = aggregate.mean_confidence.unwrap();
        assert!((mean - 0.7).abs() < 1e-6);
    }

    #[test]
    fn only_records_inside_the_day_count() {
        let records = vec![
            rec(
                Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 59).unwrap(),
                Some(Emotion::Angry),
                Some(0.9),
            ),
            rec(at(0, 0), Some(Emotion::Neutral), Some(0.4)),
            rec(
                Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
                Some(Emotion::Angry),
                Some(0.9),
            ),
        ];
        let aggregate = summarize(&records, day());
        assert_eq!(aggregate.scan_count, 1);
        assert_eq!(aggregate.dominant_emotion, Some(Emotion::Neutral));
    }

    #[test]
    fn distribution_shares_sum_to_one() {
        let records = vec![
            rec(at(11, 0), Some(Emotion::Happy), Some(0.9)),
            rec(at(11, 1), Some(Emotion::Happy), Some(0.9)),
            rec(at(11, 2), Some(Emotion::Fearful), Some(0.9)),
            rec(at(11, 3), Some(Emotion::Neutral), Some(0.9)),
        ];
        let distribution = summarize(&records, day()).distribution();
        assert_eq!(distribution.len(), 3);
        assert_eq!(distribution[0], (Emotion::Happy, 0.5));
        let total: f32 = distribution.iter().map(|(_, s)| s).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
}

//! Payload normalisation.
//!
//! Each source nests its records differently and stamps them differently
//! (epoch seconds as a string, RFC 3339, epoch microseconds, naive
//! date-time). Every normaliser yields the same [`Observation`] shape.
//! A malformed record is skipped and counted; it never fails the batch.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::{RawPayload, SignalSource};

/// One timestamped value extracted from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub at: DateTime<Utc>,
    /// Source-specific magnitude: search interest or post engagement.
    pub value: f64,
}

impl Observation {
    pub fn new(at: DateTime<Utc>, value: f64) -> Self {
        Self { at, value }
    }
}

/// Observations from one payload plus the number of records dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub observations: Vec<Observation>,
    pub skipped: usize,
}

/// Source-specific extraction rule.
pub trait PayloadNormalizer: Send + Sync {
    fn source(&self) -> SignalSource;

    /// Records on one page. A page without a record list has no records.
    fn records<'a>(&self, page: &'a Value) -> &'a [Value];

    /// Extract one observation, or `None` if the record is malformed.
    fn observation(&self, record: &Value) -> Option<Observation>;

    fn normalize(&self, payload: &RawPayload) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        for page in &payload.pages {
            for record in self.records(page) {
                match self.observation(record) {
                    Some(obs) => batch.observations.push(obs),
                    None => batch.skipped += 1,
                }
            }
        }
        batch
    }
}

fn array_at<'a>(page: &'a Value, pointer: &str) -> &'a [Value] {
    page.pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Engagement count; absent means zero, present-but-not-numeric is malformed.
fn engagement(record: &Value, pointer: &str) -> Option<f64> {
    match record.pointer(pointer) {
        None | Some(Value::Null) => Some(0.0),
        Some(v) => v.as_f64(),
    }
}

/// Google Trends interest-over-time timeline.
///
/// `{"interest_over_time": {"timeline_data": [{"timestamp": "1704067200",
/// "values": [{"extracted_value": 42}]}]}}`
pub struct TrendsNormalizer;

impl PayloadNormalizer for TrendsNormalizer {
    fn source(&self) -> SignalSource {
        SignalSource::GoogleTrends
    }

    fn records<'a>(&self, page: &'a Value) -> &'a [Value] {
        array_at(page, "/interest_over_time/timeline_data")
    }

    fn observation(&self, record: &Value) -> Option<Observation> {
        let secs = match record.get("timestamp")? {
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            other => other.as_i64()?,
        };
        let at = Utc.timestamp_opt(secs, 0).single()?;
        let value = record.pointer("/values/0/extracted_value")?.as_f64()?;
        Some(Observation::new(at, value))
    }
}

/// Twitter recent search: `{"data": [{"created_at": "2024-03-01T10:00:00.000Z",
/// "public_metrics": {"like_count": 3}}], "meta": {"next_token": "..."}}`
pub struct TwitterNormalizer;

impl PayloadNormalizer for TwitterNormalizer {
    fn source(&self) -> SignalSource {
        SignalSource::Twitter
    }

    fn records<'a>(&self, page: &'a Value) -> &'a [Value] {
        array_at(page, "/data")
    }

    fn observation(&self, record: &Value) -> Option<Observation> {
        let raw = record.get("created_at")?.as_str()?;
        let at = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
        let value = engagement(record, "/public_metrics/like_count")?;
        Some(Observation::new(at, value))
    }
}

/// Facebook post search: `{"results": [{"timestamp": 1709287200000000,
/// "reactions_count": 12}], "cursor": "..."}` with epoch-microsecond stamps.
pub struct FacebookNormalizer;

impl PayloadNormalizer for FacebookNormalizer {
    fn source(&self) -> SignalSource {
        SignalSource::Facebook
    }

    fn records<'a>(&self, page: &'a Value) -> &'a [Value] {
        array_at(page, "/results")
    }

    fn observation(&self, record: &Value) -> Option<Observation> {
        let micros = record.get("timestamp")?.as_i64()?;
        let at = DateTime::<Utc>::from_timestamp_micros(micros)?;
        let value = engagement(record, "/reactions_count")?;
        Some(Observation::new(at, value))
    }
}

/// Instagram hashtag feed: `{"data": {"items": [{"taken_at": "2024-03-01 10:00:00",
/// "like_count": 7}]}, "pagination_token": "..."}`. `taken_at` is UTC.
pub struct InstagramNormalizer;

const INSTAGRAM_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl PayloadNormalizer for InstagramNormalizer {
    fn source(&self) -> SignalSource {
        SignalSource::Instagram
    }

    fn records<'a>(&self, page: &'a Value) -> &'a [Value] {
        array_at(page, "/data/items")
    }

    fn observation(&self, record: &Value) -> Option<Observation> {
        let raw = record.get("taken_at")?.as_str()?;
        let at = NaiveDateTime::parse_from_str(raw.trim(), INSTAGRAM_TIME_FORMAT)
            .map(|naive| naive.and_utc())
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
            .ok()?;
        let value = engagement(record, "/like_count")?;
        Some(Observation::new(at, value))
    }
}

/// Normaliser for `source`.
pub fn normalizer_for(source: SignalSource) -> &'static dyn PayloadNormalizer {
    match source {
        SignalSource::GoogleTrends => &TrendsNormalizer,
        SignalSource::Twitter => &TwitterNormalizer,
        SignalSource::Facebook => &FacebookNormalizer,
        SignalSource::Instagram => &InstagramNormalizer,
    }
}

/// Normalise a payload with the normaliser for its own source.
pub fn normalize(payload: &RawPayload) -> NormalizedBatch {
    normalizer_for(payload.source).normalize(payload)
}

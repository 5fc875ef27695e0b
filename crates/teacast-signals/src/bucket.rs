//! Time bucketing of normalised observations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SignalError;
use crate::normalize::Observation;

/// Bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Year,
    YearMonth,
}

/// How observations inside one bucket collapse to a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Number of observations.
    #[default]
    Count,
    /// Sum of observation values (engagement or interest).
    Sum,
}

impl FromStr for Granularity {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "year" => Ok(Granularity::Year),
            "year_month" | "month" => Ok(Granularity::YearMonth),
            other => Err(SignalError::InvalidConfig(format!(
                "unknown granularity: {other}"
            ))),
        }
    }
}

impl FromStr for Reduction {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(Reduction::Count),
            "sum" => Ok(Reduction::Sum),
            other => Err(SignalError::InvalidConfig(format!(
                "unknown reduction: {other}"
            ))),
        }
    }
}

/// Bucket key. Orders by year, then month; a year-only key sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub year: i32,
    pub month: Option<u32>,
}

impl BucketKey {
    pub fn year(year: i32) -> Self {
        Self { year, month: None }
    }

    pub fn year_month(year: i32, month: u32) -> Self {
        Self {
            year,
            month: Some(month),
        }
    }

    pub fn for_observation(obs: &Observation, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Year => Self::year(obs.at.year()),
            Granularity::YearMonth => Self::year_month(obs.at.year(), obs.at.month()),
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            None => write!(f, "{}", self.year),
            Some(month) => write!(f, "{}-{:02}", self.year, month),
        }
    }
}

impl FromStr for BucketKey {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SignalError::InvalidConfig(format!("invalid bucket key: {s}"));
        match s.split_once('-') {
            None => s.parse().map(Self::year).map_err(|_| invalid()),
            Some((year, month)) => {
                let year = year.parse().map_err(|_| invalid())?;
                let month: u32 = month.parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(Self::year_month(year, month))
            }
        }
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BucketKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Sorted bucket map for one term.
pub type Buckets = BTreeMap<BucketKey, f64>;

/// Group `observations` by `granularity` and reduce each bucket.
pub fn aggregate(
    observations: &[Observation],
    granularity: Granularity,
    reduction: Reduction,
) -> Buckets {
    let mut buckets = Buckets::new();
    for obs in observations {
        let slot = buckets
            .entry(BucketKey::for_observation(obs, granularity))
            .or_insert(0.0);
        *slot += match reduction {
            Reduction::Count => 1.0,
            Reduction::Sum => obs.value,
        };
    }
    buckets
}

//! Time Bucketing
//!
//! Discretizes an unordered stream of timestamped samples into a contiguous
//! series of fixed-width buckets aligned to the Unix epoch (UTC). Each bucket
//! keeps the largest value observed inside it, so a fee spike is never
//! averaged away before it reaches the model.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::analyser::Observation;
use crate::error::AnalyserError;

/// Upper bound on buckets spanned by one training window. The limit counts
/// buckets, not seconds: with 1 s buckets a window may cover ~11.5 days, with
/// the default hourly buckets ~114 years.
pub const MAX_BUCKET_SPAN: i64 = 1_000_000;

/// One step of a bucketed series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub timestamp: i64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeBucketer {
    width: TimeDelta,
}

impl Default for TimeBucketer {
    fn default() -> Self {
        Self {
            width: TimeDelta::hours(1),
        }
    }
}

impl TimeBucketer {
    pub fn new(width_seconds: i64) -> Result<Self, AnalyserError> {
        match TimeDelta::try_seconds(width_seconds) {
            Some(width) if width_seconds > 0 => Ok(Self { width }),
            _ => Err(AnalyserError::InvalidConfig(format!(
                "bucket width must be a positive number of seconds, got {}",
                width_seconds
            ))),
        }
    }

    pub fn width_seconds(&self) -> i64 {
        self.width.num_seconds()
    }

    /// Truncates a timestamp to the start of its bucket.
    pub fn align(&self, timestamp: i64) -> Result<i64, AnalyserError> {
        let time = DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or_else(|| {
            AnalyserError::InvalidObservation(format!("timestamp {} is out of range", timestamp))
        })?;
        let bucket = time.duration_trunc(self.width).map_err(|e| {
            AnalyserError::InvalidObservation(format!("cannot align {}: {}", timestamp, e))
        })?;
        Ok(bucket.timestamp())
    }

    /// Whole buckets from `from` to `to` (negative when `to` is earlier).
    pub fn distance(&self, to: i64, from: i64) -> Result<i64, AnalyserError> {
        let to = self.align(to)?;
        let from = self.align(from)?;
        Ok((to - from) / self.width_seconds())
    }

    /// Bucket timestamp `steps` buckets after the bucket containing `timestamp`.
    pub fn advance(&self, timestamp: i64, steps: i64) -> Result<i64, AnalyserError> {
        let start = self.align(timestamp)?;
        steps
            .checked_mul(self.width_seconds())
            .and_then(|offset| start.checked_add(offset))
            .ok_or_else(|| {
                AnalyserError::InvalidObservation(format!(
                    "cannot advance {} by {} buckets",
                    timestamp, steps
                ))
            })
    }

    /// Groups observations into one bucket per step between the first and the
    /// last observation, inclusive. Empty buckets (or buckets whose samples all
    /// lack a value) are `None`.
    pub fn bucketize(&self, observations: &[Observation]) -> Result<Vec<Bucket>, AnalyserError> {
        if observations.is_empty() {
            return Err(AnalyserError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let mut sorted = observations.to_vec();
        sorted.sort_by_key(|o| o.timestamp);

        let first = self.align(sorted[0].timestamp)?;
        let last = self.align(sorted[sorted.len() - 1].timestamp)?;
        let span = (last - first) / self.width_seconds();
        if span >= MAX_BUCKET_SPAN {
            return Err(AnalyserError::InvalidObservation(format!(
                "samples span {} buckets, limit is {}",
                span, MAX_BUCKET_SPAN
            )));
        }

        let width = self.width_seconds();
        let mut buckets: Vec<Bucket> = (0..=span)
            .map(|i| Bucket {
                timestamp: first + i * width,
                value: None,
            })
            .collect();

        for obs in &sorted {
            let Some(value) = obs.value else { continue };
            if !value.is_finite() {
                return Err(AnalyserError::InvalidObservation(format!(
                    "non-finite value {} at {}",
                    value, obs.timestamp
                )));
            }

            let idx = ((self.align(obs.timestamp)? - first) / width) as usize;
            let slot = &mut buckets[idx].value;
            *slot = Some(slot.map_or(value, |current| current.max(value)));
        }

        Ok(buckets)
    }
}

/// Drops leading and trailing buckets without a value.
pub fn trim(buckets: &[Bucket]) -> &[Bucket] {
    let Some(start) = buckets.iter().position(|b| b.value.is_some()) else {
        return &[];
    };
    // A present value exists, so rposition cannot miss.
    let end = buckets
        .iter()
        .rposition(|b| b.value.is_some())
        .unwrap_or(start);
    &buckets[start..=end]
}

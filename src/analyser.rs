use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::algo::{
    bucket::{self, TimeBucketer},
    holtwinters::{self, SmoothingCoefficients},
    interpolate, kalman,
};
use crate::config::HoltWintersConfig;
use crate::error::AnalyserError;
use crate::forecast::{Forecast, ForecastSlot};

// --- Core Abstractions ---

/// One timestamped sample (e.g. a transaction's priority fee in gwei)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unix seconds
    pub timestamp: i64,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
        }
    }

    /// Rejects samples no analyser can train on: a non-finite value or a
    /// timestamp outside the calendar range.
    pub fn validate(&self) -> Result<(), AnalyserError> {
        if let Some(value) = self.value.filter(|v| !v.is_finite()) {
            return Err(AnalyserError::InvalidObservation(format!(
                "non-finite value {} at {}",
                value, self.timestamp
            )));
        }
        TimeBucketer::default().align(self.timestamp).map(|_| ())
    }
}

/// Result of scoring one observation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_anomaly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
}

impl Verdict {
    pub fn normal() -> Self {
        Self::default()
    }

    pub fn anomaly(expected: f64, actual: f64) -> Self {
        Self {
            is_anomaly: true,
            expected: Some(expected),
            actual: Some(actual),
        }
    }
}

/// Outcome of a `train` call plus the intermediate series, for diagnostics
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainReport {
    pub success: bool,
    /// Why training was skipped, when `success` is false
    #[serde(skip)]
    pub skipped: Option<AnalyserError>,
    pub prepared: Vec<Option<f64>>,
    pub interpolated: Vec<f64>,
    pub filtered: Vec<f64>,
    pub timestamps: Vec<i64>,
    pub coefficients: Option<SmoothingCoefficients>,
    pub mse: Option<f64>,
}

impl TrainReport {
    pub fn skipped(reason: AnalyserError) -> Self {
        Self {
            success: false,
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

/// A forecasting strategy that can be trained on a sample window and asked
/// whether a new sample is anomalous.
///
/// `train` never runs concurrently with itself for one instance, but
/// `is_anomaly` may run while `train` is in progress and must see either the
/// old or the new model.
pub trait Analyser: Send + Sync {
    /// Stable identifier used for config lookup and alert ids
    fn key(&self) -> &str;
    fn name(&self) -> &str;
    /// Fails with `Err` only when the input violates the sample contract;
    /// recoverable conditions come back as a report with `success == false`.
    fn train(&self, samples: &[Observation]) -> Result<TrainReport, AnalyserError>;
    fn is_anomaly(&self, observation: &Observation) -> Verdict;
}

// --- Holt-Winters ---

/// Seasonal forecaster over hourly buckets.
///
/// Pipeline: bucket (max per bucket) -> trim -> fill gaps -> Kalman filter ->
/// Holt-Winters fit (optionally optimized) -> forecast snapshot.
pub struct HoltWintersAnalyser {
    config: HoltWintersConfig,
    bucketer: TimeBucketer,
    coefficients: Mutex<SmoothingCoefficients>,
    forecast: ForecastSlot,
}

impl HoltWintersAnalyser {
    pub const KEY: &'static str = "holt-winters";
    pub const NAME: &'static str = "Holt Winters Analyser";

    pub fn new(config: HoltWintersConfig) -> Result<Self, AnalyserError> {
        config.validate()?;
        let bucketer = TimeBucketer::new(config.bucket_seconds)?;
        Ok(Self {
            coefficients: Mutex::new(config.coefficients()),
            config,
            bucketer,
            forecast: ForecastSlot::new(),
        })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, AnalyserError> {
        let config = serde_json::from_value(value.clone())
            .map_err(|e| AnalyserError::InvalidConfig(format!("{}: {}", Self::KEY, e)))?;
        Self::new(config)
    }

    pub fn config(&self) -> &HoltWintersConfig {
        &self.config
    }

    pub fn min_training_buckets(&self) -> usize {
        self.config.season_length * 2
    }

    /// Coefficients of the last committed model (or the configured ones)
    pub fn coefficients(&self) -> SmoothingCoefficients {
        *self
            .coefficients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn forecast(&self) -> Option<Arc<Forecast>> {
        self.forecast.load()
    }

    fn insufficient(&self, actual: usize) -> TrainReport {
        let reason = AnalyserError::InsufficientData {
            required: self.min_training_buckets(),
            actual,
        };
        warn!(analyser = Self::KEY, %reason, "Training skipped.");
        TrainReport::skipped(reason)
    }
}

impl Analyser for HoltWintersAnalyser {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn train(&self, samples: &[Observation]) -> Result<TrainReport, AnalyserError> {
        let season_length = self.config.season_length;

        if samples.len() < self.min_training_buckets() {
            return Ok(self.insufficient(samples.len()));
        }

        // 1. Bucketing
        let buckets = self.bucketer.bucketize(samples)?;
        let trimmed = bucket::trim(&buckets);
        if trimmed.len() < self.min_training_buckets() {
            return Ok(self.insufficient(trimmed.len()));
        }

        let prepared: Vec<Option<f64>> = trimmed.iter().map(|b| b.value).collect();
        let timestamps: Vec<i64> = trimmed.iter().map(|b| b.timestamp).collect();

        // 2. Gap filling and noise suppression
        let interpolated = interpolate::fill_gaps(&prepared)?;
        let filtered = kalman::smooth(&interpolated, self.config.noise);
        debug!(
            analyser = Self::KEY,
            buckets = prepared.len(),
            gaps = interpolate::gap_count(&prepared),
            "Training series prepared."
        );

        // 3. Fit, warm-started from the last committed coefficients
        let mut coefficients = self.coefficients();
        if self.config.optimization_iterations > 0 {
            let (optimized, mse) = holtwinters::optimize(
                coefficients,
                season_length,
                self.config.seasonal_mode,
                &filtered,
                self.config.optimization_iterations,
            )?;
            debug!(analyser = Self::KEY, ?optimized, mse, "Coefficients optimized.");
            coefficients = optimized;
        }

        let fit = holtwinters::fit(
            coefficients,
            season_length,
            self.config.seasonal_mode,
            &filtered,
        )?;
        if fit.predicted.iter().any(|v| !v.is_finite()) {
            warn!(analyser = Self::KEY, "Forecast diverged, keeping previous model.");
            return Ok(TrainReport::skipped(AnalyserError::NonFiniteForecast));
        }

        let last = timestamps[timestamps.len() - 1];
        let forecast = Forecast {
            predicted: fit.predicted,
            from_timestamp: timestamps[season_length],
            to_timestamp: self.bucketer.advance(last, season_length as i64)?,
            season_length,
            coefficients,
        };

        // 4. Commit
        {
            let mut current = self
                .coefficients
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            info!(
                analyser = Self::KEY,
                from = forecast.from_timestamp,
                to = forecast.to_timestamp,
                level = coefficients.level,
                trend = coefficients.trend,
                season = coefficients.season,
                "Forecast committed."
            );
            self.forecast.install(forecast);
            *current = coefficients;
        }

        Ok(TrainReport {
            success: true,
            skipped: None,
            prepared,
            interpolated,
            filtered,
            timestamps,
            coefficients: Some(coefficients),
            mse: Some(fit.mse),
        })
    }

    fn is_anomaly(&self, observation: &Observation) -> Verdict {
        let Some(forecast) = self.forecast.load() else {
            return Verdict::normal();
        };
        let Some(actual) = observation.value.filter(|v| v.is_finite()) else {
            return Verdict::normal();
        };

        let index = match self
            .bucketer
            .distance(observation.timestamp, forecast.from_timestamp)
        {
            Ok(distance) => distance + forecast.season_length as i64,
            Err(e) => {
                debug!(analyser = Self::KEY, error = %e, "Observation not scoreable.");
                return Verdict::normal();
            }
        };

        // Outside the fitted/forecast window: before the model or stale
        let Some(expected) = forecast.predicted_at(index) else {
            return Verdict::normal();
        };

        if actual > expected * (1.0 + self.config.anomaly_threshold_rate) {
            Verdict::anomaly(expected, actual)
        } else {
            Verdict::normal()
        }
    }
}

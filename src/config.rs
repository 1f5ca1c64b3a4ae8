//! Monitor and analyser configuration.
//!
//! Configuration is plain JSON. Analyser sections are kept as raw JSON until
//! the registry hands them to the analyser that owns the key, so new analyser
//! kinds can add their own settings without touching this module.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algo::holtwinters::{SeasonalMode, SmoothingCoefficients};
use crate::algo::kalman::NoiseParams;
use crate::error::{AnalyserError, ConfigError};

fn default_bucket_seconds() -> i64 {
    3600
}

fn default_max_training_samples() -> usize {
    10_000
}

/// Settings of a Holt-Winters analyser
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoltWintersConfig {
    pub season_length: usize,
    #[serde(default, alias = "trainingCycles")]
    pub optimization_iterations: usize,
    #[serde(alias = "changeRate")]
    pub anomaly_threshold_rate: f64,
    #[serde(default, alias = "alpha")]
    pub level_coef: f64,
    #[serde(default, alias = "gamma")]
    pub trend_coef: f64,
    #[serde(default, alias = "delta")]
    pub season_coef: f64,
    /// Bucket width. A training window may span at most
    /// [`MAX_BUCKET_SPAN`](crate::algo::bucket::MAX_BUCKET_SPAN) buckets, so
    /// narrow buckets shorten the usable history (1 s buckets allow ~11.5 days).
    #[serde(default = "default_bucket_seconds")]
    pub bucket_seconds: i64,
    #[serde(default)]
    pub seasonal_mode: SeasonalMode,
    #[serde(default)]
    pub noise: NoiseParams,
}

impl HoltWintersConfig {
    pub fn new(
        season_length: usize,
        optimization_iterations: usize,
        anomaly_threshold_rate: f64,
    ) -> Self {
        Self {
            season_length,
            optimization_iterations,
            anomaly_threshold_rate,
            level_coef: 0.0,
            trend_coef: 0.0,
            season_coef: 0.0,
            bucket_seconds: default_bucket_seconds(),
            seasonal_mode: SeasonalMode::default(),
            noise: NoiseParams::default(),
        }
    }

    pub fn coefficients(&self) -> SmoothingCoefficients {
        SmoothingCoefficients::new(self.level_coef, self.trend_coef, self.season_coef)
    }

    pub fn validate(&self) -> Result<(), AnalyserError> {
        let invalid = |msg: String| Err(AnalyserError::InvalidConfig(msg));

        if self.season_length == 0 {
            return invalid("seasonLength must be at least 1".to_string());
        }
        if !self.anomaly_threshold_rate.is_finite() || self.anomaly_threshold_rate < 0.0 {
            return invalid(format!(
                "anomalyThresholdRate must be a non-negative number, got {}",
                self.anomaly_threshold_rate
            ));
        }
        for (name, value) in [
            ("levelCoef", self.level_coef),
            ("trendCoef", self.trend_coef),
            ("seasonCoef", self.season_coef),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.bucket_seconds <= 0 {
            return invalid(format!(
                "bucketSeconds must be positive, got {}",
                self.bucket_seconds
            ));
        }
        for (name, value) in [
            ("processNoise", self.noise.process_noise),
            ("measurementNoise", self.noise.measurement_noise),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return invalid(format!("{} must be positive, got {}", name, value));
            }
        }
        Ok(())
    }
}

/// One analyser to build: registry key plus its own settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyserSpec {
    pub key: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A monitored entity (contract address) with its extra analysers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityConfig {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "address")]
    pub id: String,
    #[serde(default)]
    pub analysers: Vec<AnalyserSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(alias = "contracts")]
    pub entities: Vec<EntityConfig>,
    /// Analysers applied to every entity, before entity-specific ones
    #[serde(default)]
    pub analysers: Vec<AnalyserSpec>,
    #[serde(default = "default_max_training_samples", alias = "maxTrainingData")]
    pub max_training_samples: usize,
}

impl MonitorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.normalize();
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn normalize(&mut self) {
        for entity in &mut self.entities {
            entity.id = entity.id.to_lowercase();
        }
    }
}

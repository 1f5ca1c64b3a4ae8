//! Triple exponential smoothing (Holt-Winters) with bounded coefficient search.
//!
//! ```text
//! Level:    L_t = α x_t / S_{t-m} + (1 - α)(L_{t-1} + T_{t-1})
//! Trend:    T_t = β (L_t - L_{t-1}) + (1 - β) T_{t-1}
//! Season:   S_t = γ x_t / L_t + (1 - γ) S_{t-m}
//! Forecast: F_{t+h} = (L_t + h T_t) S_{t+h-m}
//! ```
//!
//! The additive variant replaces the divisions with subtractions and the
//! seasonal product with a sum.

use serde::{Deserialize, Serialize};

use crate::error::AnalyserError;

const EPSILON: f64 = 1e-12;
const INITIAL_STEP: f64 = 0.25;
const MIN_STEP: f64 = 1e-4;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SeasonalMode {
    Additive,
    #[default]
    Multiplicative,
}

impl SeasonalMode {
    fn combine(self, base: f64, seasonal: f64) -> f64 {
        match self {
            Self::Additive => base + seasonal,
            Self::Multiplicative => base * seasonal,
        }
    }

    fn deseasonalize(self, value: f64, seasonal: f64) -> f64 {
        match self {
            Self::Additive => value - seasonal,
            Self::Multiplicative if seasonal.abs() < EPSILON => value,
            Self::Multiplicative => value / seasonal,
        }
    }

    fn seasonal_index(self, value: f64, level: f64) -> f64 {
        match self {
            Self::Additive => value - level,
            Self::Multiplicative if level.abs() < EPSILON => 1.0,
            Self::Multiplicative => value / level,
        }
    }
}

/// Smoothing factors for level (α), trend (β) and season (γ), each in `[0, 1]`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct SmoothingCoefficients {
    pub level: f64,
    pub trend: f64,
    pub season: f64,
}

impl SmoothingCoefficients {
    pub fn new(level: f64, trend: f64, season: f64) -> Self {
        Self {
            level,
            trend,
            season,
        }
    }

    fn get(&self, idx: usize) -> f64 {
        match idx {
            0 => self.level,
            1 => self.trend,
            _ => self.season,
        }
    }

    fn with(mut self, idx: usize, value: f64) -> Self {
        let value = value.clamp(0.0, 1.0);
        match idx {
            0 => self.level = value,
            1 => self.trend = value,
            _ => self.season = value,
        }
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HoltWinters {
    alpha: f64,    // Level smoothing factor
    beta: f64,     // Trend smoothing factor
    gamma: f64,    // Seasonality smoothing factor
    period: usize, // Season length in buckets
    mode: SeasonalMode,

    level: f64,
    trend: f64,
    seasonals: Vec<f64>, // Indexed by step % period

    step: usize,
}

impl HoltWinters {
    /// Seeds the model from the first two seasons of `history`. Only the first
    /// season feeds level and seasonal indices; the second one sets the trend.
    pub fn seed(
        coefficients: SmoothingCoefficients,
        period: usize,
        mode: SeasonalMode,
        history: &[f64],
    ) -> Result<Self, AnalyserError> {
        if period == 0 {
            return Err(AnalyserError::InvalidConfig(
                "season length must be at least 1".to_string(),
            ));
        }
        let required = period * 2;
        if history.len() < required {
            return Err(AnalyserError::InsufficientData {
                required,
                actual: history.len(),
            });
        }

        let m = period as f64;
        let level = history[..period].iter().sum::<f64>() / m;
        let trend = (0..period)
            .map(|i| (history[period + i] - history[i]) / m)
            .sum::<f64>()
            / m;
        let seasonals = history[..period]
            .iter()
            .map(|&x| mode.seasonal_index(x, level))
            .collect();

        Ok(Self {
            alpha: coefficients.level.clamp(0.0, 1.0),
            beta: coefficients.trend.clamp(0.0, 1.0),
            gamma: coefficients.season.clamp(0.0, 1.0),
            period,
            mode,
            level,
            trend,
            seasonals,
            step: period,
        })
    }

    /// Feeds one value. Returns (prediction made before seeing it, deviation).
    pub fn update(&mut self, value: f64) -> (f64, f64) {
        let season_idx = self.step % self.period;
        let last_seasonal = self.seasonals[season_idx];

        let prediction = self.mode.combine(self.level + self.trend, last_seasonal);
        let deviation = value - prediction;

        let last_level = self.level;
        let last_trend = self.trend;

        self.level = self.alpha * self.mode.deseasonalize(value, last_seasonal)
            + (1.0 - self.alpha) * (last_level + last_trend);
        self.trend = self.beta * (self.level - last_level) + (1.0 - self.beta) * last_trend;
        self.seasonals[season_idx] = self.gamma * self.mode.seasonal_index(value, self.level)
            + (1.0 - self.gamma) * last_seasonal;

        self.step += 1;

        (prediction, deviation)
    }

    /// Prediction `horizon` steps past the last value fed (`horizon >= 1`).
    pub fn forecast(&self, horizon: usize) -> f64 {
        let horizon = horizon.max(1);
        let season_idx = (self.step + horizon - 1) % self.period;
        self.mode.combine(
            self.level + horizon as f64 * self.trend,
            self.seasonals[season_idx],
        )
    }

    pub fn get_seasonality(&self) -> &[f64] {
        &self.seasonals
    }

    pub fn level(&self) -> f64 {
        self.level
    }
}

/// Output of a full pass over a training series
#[derive(Debug, Clone)]
pub struct Fit {
    /// `len(series) + period` values: seed reconstruction for the first season,
    /// one-step-ahead predictions for the rest of the series, then one season
    /// of forecast.
    pub predicted: Vec<f64>,
    /// Mean squared one-step-ahead error over the series after the first season
    pub mse: f64,
}

pub fn fit(
    coefficients: SmoothingCoefficients,
    period: usize,
    mode: SeasonalMode,
    series: &[f64],
) -> Result<Fit, AnalyserError> {
    let mut model = HoltWinters::seed(coefficients, period, mode, series)?;

    let mut predicted = Vec::with_capacity(series.len() + period);
    predicted.extend(
        model
            .get_seasonality()
            .iter()
            .map(|&s| mode.combine(model.level(), s)),
    );

    let mut squared_error = 0.0;
    for &value in &series[period..] {
        let (prediction, deviation) = model.update(value);
        predicted.push(prediction);
        squared_error += deviation * deviation;
    }

    predicted.extend((1..=period).map(|h| model.forecast(h)));

    let mse = squared_error / (series.len() - period) as f64;
    Ok(Fit { predicted, mse })
}

fn score(
    coefficients: SmoothingCoefficients,
    period: usize,
    mode: SeasonalMode,
    series: &[f64],
) -> Result<f64, AnalyserError> {
    let mse = fit(coefficients, period, mode, series)?.mse;
    Ok(if mse.is_finite() { mse } else { f64::INFINITY })
}

/// Coordinate descent over (α, β, γ). Each iteration tries one step up and
/// one step down per coefficient and keeps the first improvement; an
/// iteration without improvement halves the step. Never runs more than
/// `iterations` rounds and never leaves `[0, 1]`.
pub fn optimize(
    start: SmoothingCoefficients,
    period: usize,
    mode: SeasonalMode,
    series: &[f64],
    iterations: usize,
) -> Result<(SmoothingCoefficients, f64), AnalyserError> {
    let mut best = SmoothingCoefficients::new(
        start.level.clamp(0.0, 1.0),
        start.trend.clamp(0.0, 1.0),
        start.season.clamp(0.0, 1.0),
    );
    let mut best_err = score(best, period, mode, series)?;
    let mut step = INITIAL_STEP;

    for _ in 0..iterations {
        if step < MIN_STEP {
            break;
        }

        let mut improved = false;
        for idx in 0..3 {
            for direction in [1.0, -1.0] {
                let current = best.get(idx);
                let candidate = best.with(idx, current + direction * step);
                if candidate.get(idx) == current {
                    continue;
                }

                let err = score(candidate, period, mode, series)?;
                if err < best_err {
                    best = candidate;
                    best_err = err;
                    improved = true;
                    break;
                }
            }
        }

        if !improved {
            step /= 2.0;
        }
    }

    Ok((best, best_err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasonal_series(seasons: usize, period: usize) -> Vec<f64> {
        (0..seasons * period)
            .map(|i| {
                let phase = (i % period) as f64 / period as f64;
                100.0 + 20.0 * (phase * std::f64::consts::TAU).sin() + i as f64 * 0.1
            })
            .collect()
    }

    #[test]
    fn test_constant_series_forecasts_constant() {
        let series = vec![100.0; 40];
        let result = fit(
            SmoothingCoefficients::default(),
            20,
            SeasonalMode::Multiplicative,
            &series,
        )
        .unwrap();

        assert_eq!(result.predicted.len(), 60);
        assert!(result.predicted.iter().all(|v| (v - 100.0).abs() < 1e-9));
        assert!(result.mse < 1e-12);
    }

    #[test]
    fn test_requires_two_seasons() {
        let series = vec![1.0; 39];
        let result = fit(
            SmoothingCoefficients::default(),
            20,
            SeasonalMode::Multiplicative,
            &series,
        );
        assert_eq!(
            result.unwrap_err(),
            AnalyserError::InsufficientData {
                required: 40,
                actual: 39
            }
        );
    }

    #[test]
    fn test_seed_trend_and_seasonality() {
        // Two seasons of a pure ramp: trend should be one unit per step
        let series: Vec<f64> = (0..8).map(|i| 10.0 + i as f64).collect();
        let model = HoltWinters::seed(
            SmoothingCoefficients::default(),
            4,
            SeasonalMode::Additive,
            &series,
        )
        .unwrap();

        assert!((model.level() - 11.5).abs() < 1e-12);
        assert!((model.trend - 1.0).abs() < 1e-12);
        assert_eq!(model.get_seasonality(), &[-1.5, -0.5, 0.5, 1.5]);
    }

    #[test]
    fn test_forecast_repeats_season() {
        let period = 6;
        let series = seasonal_series(4, period);
        let result = fit(
            SmoothingCoefficients::new(0.5, 0.1, 0.3),
            period,
            SeasonalMode::Multiplicative,
            &series,
        )
        .unwrap();

        let horizon = &result.predicted[series.len()..];
        assert_eq!(horizon.len(), period);
        let peak = horizon
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // Sine peaks at a quarter season
        assert!(peak == 1 || peak == 2, "peak at {}", peak);
    }

    #[test]
    fn test_zero_level_does_not_produce_nan() {
        let series = vec![0.0; 12];
        let result = fit(
            SmoothingCoefficients::new(0.5, 0.5, 0.5),
            3,
            SeasonalMode::Multiplicative,
            &series,
        )
        .unwrap();
        assert!(result.predicted.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_optimize_improves_and_stays_bounded() {
        let period = 6;
        let series = seasonal_series(5, period);
        let start = SmoothingCoefficients::default();

        let baseline = fit(start, period, SeasonalMode::Multiplicative, &series)
            .unwrap()
            .mse;
        let (coefs, mse) =
            optimize(start, period, SeasonalMode::Multiplicative, &series, 20).unwrap();

        assert!(mse <= baseline);
        for c in [coefs.level, coefs.trend, coefs.season] {
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn test_optimize_with_zero_iterations_keeps_start() {
        let series = seasonal_series(3, 4);
        let start = SmoothingCoefficients::new(0.3, 0.2, 0.1);
        let (coefs, _) = optimize(start, 4, SeasonalMode::Additive, &series, 0).unwrap();
        assert_eq!(coefs, start);
    }

    #[test]
    fn test_update_returns_prediction_and_deviation() {
        let mut model = HoltWinters::seed(
            SmoothingCoefficients::default(),
            2,
            SeasonalMode::Additive,
            &[5.0, 5.0, 5.0, 5.0],
        )
        .unwrap();
        let (prediction, deviation) = model.update(8.0);
        assert!((prediction - 5.0).abs() < 1e-12);
        assert!((deviation - 3.0).abs() < 1e-12);
    }
}

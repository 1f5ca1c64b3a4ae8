//! Committed forecasts and their publication slot.
//!
//! A forecast is built completely by `train`, then installed with a single
//! pointer swap. Readers clone the `Arc` and keep scoring against that
//! snapshot even if a newer one is installed while they run.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::algo::holtwinters::SmoothingCoefficients;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Forecast {
    /// Seed season, fitted series, then one season ahead
    pub predicted: Vec<f64>,
    /// Bucket at offset `season_length` in the training series
    pub from_timestamp: i64,
    /// Bucket `season_length` steps after the last training bucket
    pub to_timestamp: i64,
    pub season_length: usize,
    /// Coefficients the forecast was produced with
    pub coefficients: SmoothingCoefficients,
}

impl Forecast {
    /// Predicted value at `index`, restricted to the scoreable window
    /// `[season_length, predicted.len())`.
    pub fn predicted_at(&self, index: i64) -> Option<f64> {
        if index < self.season_length as i64 {
            return None;
        }
        self.predicted.get(usize::try_from(index).ok()?).copied()
    }
}

/// Single-writer, multi-reader holder of the current forecast
#[derive(Debug, Default)]
pub struct ForecastSlot {
    current: RwLock<Option<Arc<Forecast>>>,
}

impl ForecastSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<Forecast>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current forecast, returning the previous one.
    pub fn install(&self, forecast: Forecast) -> Option<Arc<Forecast>> {
        let next = Arc::new(forecast);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.replace(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast(value: f64) -> Forecast {
        Forecast {
            predicted: vec![value; 6],
            from_timestamp: 0,
            to_timestamp: 0,
            season_length: 2,
            coefficients: SmoothingCoefficients::default(),
        }
    }

    #[test]
    fn test_install_replaces_snapshot() {
        let slot = ForecastSlot::new();
        assert!(slot.load().is_none());

        assert!(slot.install(forecast(1.0)).is_none());
        let held = slot.load().unwrap();

        let previous = slot.install(forecast(2.0)).unwrap();
        assert_eq!(previous.predicted[0], 1.0);
        // Readers keep the snapshot they loaded
        assert_eq!(held.predicted[0], 1.0);
        assert_eq!(slot.load().unwrap().predicted[0], 2.0);
    }

    #[test]
    fn test_predicted_at_bounds() {
        let f = forecast(3.0);
        assert_eq!(f.predicted_at(-1), None);
        assert_eq!(f.predicted_at(1), None);
        assert_eq!(f.predicted_at(2), Some(3.0));
        assert_eq!(f.predicted_at(5), Some(3.0));
        assert_eq!(f.predicted_at(6), None);
    }

    #[test]
    fn test_concurrent_readers_see_complete_snapshots() {
        let slot = Arc::new(ForecastSlot::new());
        slot.install(forecast(0.0));

        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for i in 1..200 {
                    slot.install(forecast(i as f64));
                }
            })
        };

        for _ in 0..200 {
            let snapshot = slot.load().unwrap();
            let first = snapshot.predicted[0];
            assert!(snapshot.predicted.iter().all(|v| *v == first));
        }
        writer.join().unwrap();
    }
}

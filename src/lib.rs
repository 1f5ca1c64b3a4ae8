//! Seasonal anomaly detection for per-entity priority-fee series.
//!
//! Samples are bucketed hourly, gaps are filled, noise is filtered and a
//! Holt-Winters model forecasts one season ahead. New samples are flagged when
//! they exceed the forecast by more than a configured rate.

use std::os::raw::{c_double, c_longlong};

pub mod algo;
pub mod analyser;
pub mod config;
pub mod error;
pub mod fees;
pub mod forecast;
pub mod metrics;
pub mod monitor;
pub mod registry;

pub use analyser::{Analyser, HoltWintersAnalyser, Observation, TrainReport, Verdict};
pub use config::{AnalyserSpec, EntityConfig, HoltWintersConfig, MonitorConfig};
pub use error::{AnalyserError, ConfigError};
pub use fees::effective_priority_fee;
pub use forecast::{Forecast, ForecastSlot};
pub use monitor::{FeeMonitor, Finding, Severity};
pub use registry::AnalyserRegistry;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckResult {
    pub is_anomaly: bool,
    pub expected: f64,
    pub actual: f64,
}

// --- Analyser FFI ---

/// Returns null when the parameters are invalid.
#[unsafe(no_mangle)]
pub extern "C" fn create_analyser(
    season_length: usize,
    optimization_iterations: usize,
    anomaly_threshold_rate: c_double,
) -> *mut HoltWintersAnalyser {
    let config = HoltWintersConfig::new(
        season_length,
        optimization_iterations,
        anomaly_threshold_rate,
    );
    match HoltWintersAnalyser::new(config) {
        Ok(analyser) => Box::into_raw(Box::new(analyser)),
        Err(_) => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn free_analyser(ptr: *mut HoltWintersAnalyser) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(ptr);
    }
}

/// Trains on `len` samples. A NaN value marks a sample without a fee.
/// Returns true when a new forecast was committed.
#[unsafe(no_mangle)]
pub extern "C" fn analyser_train(
    ptr: *mut HoltWintersAnalyser,
    timestamps: *const c_longlong,
    values: *const c_double,
    len: usize,
) -> bool {
    if ptr.is_null() || timestamps.is_null() || values.is_null() {
        return false;
    }

    let (timestamps, values) = unsafe {
        (
            std::slice::from_raw_parts(timestamps, len),
            std::slice::from_raw_parts(values, len),
        )
    };
    let samples: Vec<Observation> = timestamps
        .iter()
        .zip(values)
        .map(|(&timestamp, &value)| Observation {
            timestamp,
            value: (!value.is_nan()).then_some(value),
        })
        .collect();

    let analyser = unsafe { &*ptr };
    analyser
        .train(&samples)
        .map(|report| report.success)
        .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn analyser_check(
    ptr: *const HoltWintersAnalyser,
    timestamp: c_longlong,
    value: c_double,
    out_result: *mut CheckResult,
) {
    if ptr.is_null() || out_result.is_null() {
        return;
    }

    let analyser = unsafe { &*ptr };
    let observation = Observation {
        timestamp,
        value: (!value.is_nan()).then_some(value),
    };
    let verdict = analyser.is_anomaly(&observation);

    unsafe {
        *out_result = CheckResult {
            is_anomaly: verdict.is_anomaly,
            expected: verdict.expected.unwrap_or(f64::NAN),
            actual: verdict.actual.unwrap_or(value),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffi_round_trip() {
        let ptr = create_analyser(4, 0, 0.5);
        assert!(!ptr.is_null());

        let base = 1_646_092_800i64;
        let timestamps: Vec<i64> = (0..8).map(|i| base + i * 3600).collect();
        let values = vec![10.0; 8];
        assert!(analyser_train(
            ptr,
            timestamps.as_ptr(),
            values.as_ptr(),
            timestamps.len()
        ));

        let mut result = CheckResult::default();
        analyser_check(ptr, base + 9 * 3600, 40.0, &mut result);
        assert!(result.is_anomaly);
        assert_eq!(result.actual, 40.0);

        analyser_check(ptr, base + 9 * 3600, f64::NAN, &mut result);
        assert!(!result.is_anomaly);

        free_analyser(ptr);
    }

    #[test]
    fn test_ffi_rejects_invalid_config() {
        assert!(create_analyser(0, 0, 0.5).is_null());
        assert!(create_analyser(4, 0, -1.0).is_null());
    }
}

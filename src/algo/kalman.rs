use serde::{Deserialize, Serialize};

/// Sensitivity of the noise filter.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NoiseParams {
    /// How far the true signal is expected to move between buckets
    #[serde(alias = "R")]
    pub process_noise: f64,
    /// How noisy a single bucket reading is
    #[serde(alias = "Q")]
    pub measurement_noise: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            process_noise: 0.1,
            measurement_noise: 6.0,
        }
    }
}

/// Scalar Kalman filter with a constant state model.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KalmanFilter {
    process_noise: f64,
    measurement_noise: f64,
    estimate: f64,
    covariance: f64,
    initialized: bool,
}

impl KalmanFilter {
    pub fn new(params: NoiseParams) -> Self {
        Self {
            process_noise: params.process_noise,
            measurement_noise: params.measurement_noise,
            estimate: 0.0,
            covariance: 0.0,
            initialized: false,
        }
    }

    pub fn filter(&mut self, measurement: f64) -> f64 {
        if !self.initialized {
            self.estimate = measurement;
            self.covariance = self.measurement_noise;
            self.initialized = true;
            return self.estimate;
        }

        // Predict
        let predicted_cov = self.covariance + self.process_noise;

        // Update
        let gain = predicted_cov / (predicted_cov + self.measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.covariance = predicted_cov - gain * predicted_cov;

        self.estimate
    }

}

/// Smooths a whole series with a fresh filter, one output per input.
pub fn smooth(values: &[f64], params: NoiseParams) -> Vec<f64> {
    let mut filter = KalmanFilter::new(params);
    values.iter().map(|&v| filter.filter(v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_length_matches_input() {
        for n in [0, 1, 2, 17, 100] {
            let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
            assert_eq!(smooth(&data, NoiseParams::default()).len(), n);
        }
    }

    #[test]
    fn test_constant_signal_is_unchanged() {
        let data = vec![100.0; 40];
        let result = smooth(&data, NoiseParams::default());
        assert!(result.iter().all(|v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_first_output_equals_first_input() {
        let mut filter = KalmanFilter::new(NoiseParams::default());
        assert_eq!(filter.filter(42.0), 42.0);
        assert_eq!(filter.covariance, 6.0);
    }

    #[test]
    fn test_suppresses_alternating_noise() {
        let data: Vec<f64> = (0..60)
            .map(|i| 100.0 + if i % 2 == 0 { 5.0 } else { -5.0 })
            .collect();
        let result = smooth(&data, NoiseParams::default());

        let tail = &result[30..];
        let spread = tail.iter().cloned().fold(f64::MIN, f64::max)
            - tail.iter().cloned().fold(f64::MAX, f64::min);
        assert!(spread < 10.0, "filtered spread {} not below raw spread", spread);
    }

    #[test]
    fn test_output_depends_only_on_prefix() {
        let a = smooth(&[1.0, 2.0, 3.0, 4.0], NoiseParams::default());
        let b = smooth(&[1.0, 2.0, 3.0, 400.0], NoiseParams::default());
        assert_eq!(a[..3], b[..3]);
        assert!(b[3] > a[3]);
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: NoiseParams = serde_json::from_str(r#"{"processNoise": 0.5}"#).unwrap();
        assert_eq!(params.process_noise, 0.5);
        assert_eq!(params.measurement_noise, 6.0);
    }
}

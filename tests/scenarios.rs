use std::sync::Arc;
use std::thread;

use feewatch::{
    Analyser, AnalyserRegistry, FeeMonitor, HoltWintersAnalyser, HoltWintersConfig,
    MonitorConfig, Observation,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const HOUR: i64 = 3600;
// 2022-03-01T00:00:00Z
const BASE: i64 = 1_646_092_800;

fn hourly(count: usize, value: f64) -> Vec<Observation> {
    (0..count)
        .map(|i| Observation::new(BASE + i as i64 * HOUR + 90, value))
        .collect()
}

fn trained_constant() -> HoltWintersAnalyser {
    let analyser = HoltWintersAnalyser::new(HoltWintersConfig::new(20, 0, 0.5)).unwrap();
    let report = analyser.train(&hourly(40, 100.0)).unwrap();
    assert!(report.success);
    analyser
}

#[test]
fn test_constant_series_end_to_end() {
    let analyser = trained_constant();
    let forecast = analyser.forecast().unwrap();
    assert!(
        forecast
            .predicted
            .iter()
            .all(|v| (v - 100.0).abs() < 1e-6)
    );

    let inside = BASE + 50 * HOUR + 1800;
    let spike = analyser.is_anomaly(&Observation::new(inside, 200.0));
    assert!(spike.is_anomaly);
    assert!((spike.expected.unwrap() - 100.0).abs() < 1e-6);
    assert_eq!(spike.actual, Some(200.0));

    assert!(!analyser.is_anomaly(&Observation::new(inside, 120.0)).is_anomaly);
}

#[test]
fn test_observation_before_forecast_is_never_anomalous() {
    let analyser = trained_constant();
    let from = analyser.forecast().unwrap().from_timestamp;

    for offset in [1, HOUR, 10 * HOUR, 1000 * HOUR] {
        let verdict = analyser.is_anomaly(&Observation::new(from - offset, 1e9));
        assert!(!verdict.is_anomaly, "flagged {} seconds before forecast", offset);
    }
}

#[test]
fn test_stale_model_is_never_anomalous() {
    let analyser = trained_constant();
    let to = analyser.forecast().unwrap().to_timestamp;

    // Last forecast bucket is still scored
    assert!(analyser.is_anomaly(&Observation::new(to, 1e9)).is_anomaly);
    for offset in [HOUR, 2 * HOUR, 500 * HOUR] {
        assert!(!analyser.is_anomaly(&Observation::new(to + offset, 1e9)).is_anomaly);
    }
}

#[test]
fn test_failed_training_keeps_previous_forecast() {
    let analyser = trained_constant();
    let probe = Observation::new(BASE + 45 * HOUR, 200.0);
    assert!(analyser.is_anomaly(&probe).is_anomaly);

    let report = analyser.train(&hourly(25, 10.0)).unwrap();
    assert!(!report.success);

    let verdict = analyser.is_anomaly(&probe);
    assert!(verdict.is_anomaly);
    assert!((verdict.expected.unwrap() - 100.0).abs() < 1e-6);
}

#[test]
fn test_cold_start_never_flags() {
    let analyser = HoltWintersAnalyser::new(HoltWintersConfig::new(20, 0, 0.5)).unwrap();
    for value in [0.0, 1.0, 1e6, f64::MAX] {
        assert!(!analyser.is_anomaly(&Observation::new(BASE, value)).is_anomaly);
    }
}

#[test]
fn test_noisy_daily_season_flags_injected_spike() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut samples = Vec::new();
    for hour in 0..24 * 6 {
        let phase = (hour % 24) as f64 / 24.0 * std::f64::consts::TAU;
        let expected = 20.0 + 8.0 * phase.sin();
        for _ in 0..5 {
            let t = BASE + hour * HOUR + rng.random_range(0..HOUR);
            samples.push(Observation::new(t, expected * rng.random_range(0.9..1.1)));
        }
    }

    let analyser = HoltWintersAnalyser::new(HoltWintersConfig::new(24, 30, 1.0)).unwrap();
    let report = analyser.train(&samples).unwrap();
    assert!(report.success);
    assert_eq!(report.timestamps.len(), 24 * 6);

    let next = BASE + 24 * 6 * HOUR + 6 * HOUR;
    assert!(analyser.is_anomaly(&Observation::new(next, 400.0)).is_anomaly);
    assert!(!analyser.is_anomaly(&Observation::new(next, 25.0)).is_anomaly);
}

#[test]
fn test_scoring_during_retraining_sees_complete_models() {
    let analyser = Arc::new(trained_constant());
    let probe = Observation::new(BASE + 45 * HOUR, 1e6);

    let trainer = {
        let analyser = Arc::clone(&analyser);
        thread::spawn(move || {
            for round in 0..20 {
                let level = if round % 2 == 0 { 50.0 } else { 100.0 };
                assert!(analyser.train(&hourly(40, level)).unwrap().success);
            }
        })
    };

    for _ in 0..500 {
        let verdict = analyser.is_anomaly(&probe);
        assert!(verdict.is_anomaly);
        let expected = verdict.expected.unwrap();
        assert!(
            (expected - 50.0).abs() < 1e-6 || (expected - 100.0).abs() < 1e-6,
            "partial model observed: {}",
            expected
        );
    }
    trainer.join().unwrap();
}

#[test]
fn test_monitor_from_json_config() {
    let raw = r#"{
        "entities": [{ "name": "Bridge", "id": "0xB1" }],
        "analysers": [{
            "key": "holt-winters",
            "config": { "seasonLength": 6, "optimizationIterations": 4, "anomalyThresholdRate": 2 }
        }],
        "maxTrainingSamples": 200
    }"#;
    let config = MonitorConfig::from_json_str(raw).unwrap();
    let mut monitor = FeeMonitor::new(&config, &AnalyserRegistry::builtin()).unwrap();

    for i in 0..24 {
        let findings = monitor.observe("0xb1", None, Observation::new(BASE + i * HOUR, 3.0));
        assert!(findings.is_empty());
    }
    assert_eq!(monitor.on_block(), 1);

    let findings = monitor.observe("0xB1", Some("0xabc"), Observation::new(BASE + 25 * HOUR, 30.0));
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].analyser_key, "holt-winters");
    assert_eq!(findings[0].entity, "0xb1");
}

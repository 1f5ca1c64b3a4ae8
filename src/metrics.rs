//! Process-wide Prometheus metrics, registered with the default registry.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, TextEncoder};

pub static SAMPLES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("feewatch_samples_total", "Total fee samples observed").unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static TRAININGS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("feewatch_trainings_total", "Training runs by outcome"),
        &["analyser", "outcome"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static ANOMALIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new("feewatch_anomalies_total", "Anomalous fees detected"),
        &["analyser"],
    )
    .unwrap();
    prometheus::register(Box::new(c.clone())).unwrap();
    c
});

pub static TRAINING_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let h = Histogram::with_opts(HistogramOpts::new(
        "feewatch_training_duration_seconds",
        "Histogram of analyser training time",
    ))
    .unwrap();
    prometheus::register(Box::new(h.clone())).unwrap();
    h
});

/// Touches every metric so they are exported before the first event.
pub fn init() {
    let _ = &*SAMPLES_TOTAL;
    let _ = &*TRAININGS_TOTAL;
    let _ = &*ANOMALIES_TOTAL;
    let _ = &*TRAINING_DURATION;
}

/// Text exposition of the default registry.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        init();
        SAMPLES_TOTAL.inc();
        TRAININGS_TOTAL.with_label_values(&["holt-winters", "success"]).inc();

        let text = render();
        assert!(text.contains("feewatch_samples_total"));
        assert!(text.contains("feewatch_trainings_total"));
    }
}

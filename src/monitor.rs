//! Per-Entity Fee Monitor
//!
//! Owns the analysers and the bounded sample window of every monitored
//! entity. Each sample is scored against the committed models first and then
//! added to the window; retraining happens on block ticks, and only for
//! entities that received samples since their last training.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyser::{Analyser, Observation};
use crate::config::MonitorConfig;
use crate::error::AnalyserError;
use crate::metrics::{ANOMALIES_TOTAL, SAMPLES_TOTAL, TRAINING_DURATION, TRAININGS_TOTAL};
use crate::registry::AnalyserRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Grades by how many times the expected fee was paid.
    pub fn classify(expected: f64, actual: f64) -> Self {
        if expected <= 0.0 {
            return Self::Critical;
        }
        let ratio = actual / expected;
        if ratio >= 10.0 {
            Self::Critical
        } else if ratio >= 5.0 {
            Self::High
        } else {
            Self::Medium
        }
    }
}

/// Alert raised for an anomalous priority fee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub alert_id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub entity: String,
    pub sender: Option<String>,
    pub analyser_key: String,
    pub analyser_name: String,
    pub expected: f64,
    pub actual: f64,
    pub timestamp: i64,
}

impl Finding {
    pub fn new(
        analyser: &dyn Analyser,
        entity: &str,
        sender: Option<&str>,
        observation: &Observation,
        expected: f64,
        actual: f64,
    ) -> Self {
        let description = if expected > 0.0 {
            let diff_percent = ((actual - expected) / expected).abs() * 100.0;
            format!(
                "{}: Priority fee {:.2} Gwei is {:.2}% greater than expected",
                analyser.name(),
                actual,
                diff_percent
            )
        } else {
            format!(
                "{}: Priority fee {:.2} Gwei while {:.2} Gwei was expected",
                analyser.name(),
                actual,
                expected
            )
        };

        Self {
            alert_id: format!("ANOMALOUS-PRIORITY-FEE-{}", analyser.key().to_uppercase()),
            name: "High Priority Fee".to_string(),
            description,
            severity: Severity::classify(expected, actual),
            entity: entity.to_string(),
            sender: sender.map(str::to_lowercase),
            analyser_key: analyser.key().to_string(),
            analyser_name: analyser.name().to_string(),
            expected,
            actual,
            timestamp: observation.timestamp,
        }
    }
}

struct EntityState {
    name: String,
    analysers: Vec<Box<dyn Analyser>>,
    samples: VecDeque<Observation>,
    up_to_date: bool,
}

pub struct FeeMonitor {
    entities: HashMap<String, EntityState>,
    max_training_samples: usize,
}

impl FeeMonitor {
    pub fn new(config: &MonitorConfig, registry: &AnalyserRegistry) -> Result<Self, AnalyserError> {
        Self::with_filter(config, registry, |_| true)
    }

    /// Builds state only for entities accepted by `filter` (used for sharding).
    pub fn with_filter(
        config: &MonitorConfig,
        registry: &AnalyserRegistry,
        filter: impl Fn(&str) -> bool,
    ) -> Result<Self, AnalyserError> {
        let mut entities = HashMap::new();

        for entity in config.entities.iter().filter(|e| filter(&e.id)) {
            let mut analysers = Vec::new();
            for spec in config.analysers.iter().chain(&entity.analysers) {
                match registry.build(spec) {
                    Ok(analyser) => analysers.push(analyser),
                    Err(AnalyserError::UnknownAnalyser(key)) => {
                        warn!(entity = %entity.id, key = %key, "Unknown analyser, skipping.");
                    }
                    Err(e) => return Err(e),
                }
            }

            entities.insert(
                entity.id.to_lowercase(),
                EntityState {
                    name: entity.name.clone(),
                    analysers,
                    samples: VecDeque::new(),
                    up_to_date: true,
                },
            );
        }

        info!(
            entities = entities.len(),
            max_samples = config.max_training_samples,
            "Fee monitor configured."
        );

        Ok(Self {
            entities,
            max_training_samples: config.max_training_samples,
        })
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(&entity.to_lowercase())
    }

    pub fn entity_name(&self, entity: &str) -> Option<&str> {
        self.entities
            .get(&entity.to_lowercase())
            .map(|s| s.name.as_str())
    }

    pub fn sample_count(&self, entity: &str) -> usize {
        self.entities
            .get(&entity.to_lowercase())
            .map_or(0, |s| s.samples.len())
    }

    pub fn is_up_to_date(&self, entity: &str) -> bool {
        self.entities
            .get(&entity.to_lowercase())
            .is_none_or(|s| s.up_to_date)
    }

    /// Scores a sample with every analyser of `entity`, then records it for
    /// the next training round. Unknown entities and empty samples are ignored.
    pub fn observe(
        &mut self,
        entity: &str,
        sender: Option<&str>,
        observation: Observation,
    ) -> Vec<Finding> {
        let entity = entity.to_lowercase();
        let Some(state) = self.entities.get_mut(&entity) else {
            return Vec::new();
        };
        let Some(value) = observation.value else {
            debug!(entity = %entity, "Sample without fee ignored.");
            return Vec::new();
        };
        if let Err(e) = observation.validate() {
            warn!(entity = %entity, error = %e, "Dropping invalid sample.");
            return Vec::new();
        }
        SAMPLES_TOTAL.inc();

        let mut findings = Vec::new();
        for analyser in &state.analysers {
            let verdict = analyser.is_anomaly(&observation);
            if !verdict.is_anomaly {
                continue;
            }

            let expected = verdict.expected.unwrap_or_default();
            let actual = verdict.actual.unwrap_or(value);
            ANOMALIES_TOTAL.with_label_values(&[analyser.key()]).inc();
            warn!(
                entity = %entity,
                analyser = analyser.key(),
                expected,
                actual,
                "ANOMALY"
            );
            findings.push(Finding::new(
                analyser.as_ref(),
                &entity,
                sender,
                &observation,
                expected,
                actual,
            ));
        }

        state.samples.push_back(observation);
        while state.samples.len() > self.max_training_samples {
            state.samples.pop_front();
        }
        state.up_to_date = false;

        findings
    }

    /// Retrains every entity that received samples since its last training.
    /// Returns the number of entities retrained.
    pub fn on_block(&mut self) -> usize {
        let mut trained = 0;

        for (entity, state) in &mut self.entities {
            if state.up_to_date || state.samples.is_empty() || state.analysers.is_empty() {
                continue;
            }

            let samples = state.samples.make_contiguous();
            for analyser in &state.analysers {
                let timer = TRAINING_DURATION.start_timer();
                let outcome = match analyser.train(samples) {
                    Ok(report) if report.success => "success",
                    Ok(_) => "skipped",
                    Err(e) => {
                        warn!(entity = %entity, analyser = analyser.key(), error = %e, "Training failed.");
                        "error"
                    }
                };
                timer.observe_duration();
                TRAININGS_TOTAL
                    .with_label_values(&[analyser.key(), outcome])
                    .inc();
            }

            state.up_to_date = true;
            trained += 1;
        }

        if trained > 0 {
            debug!(entities = trained, "Block processed.");
        }
        trained
    }
}

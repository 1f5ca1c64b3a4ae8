//! Analyser Registry
//!
//! Maps stable analyser keys to constructors so the monitor can build every
//! configured variant per entity without knowing the concrete types.

use std::collections::BTreeMap;

use crate::analyser::{Analyser, HoltWintersAnalyser};
use crate::config::AnalyserSpec;
use crate::error::AnalyserError;

pub type AnalyserFactory =
    fn(&serde_json::Value) -> Result<Box<dyn Analyser>, AnalyserError>;

pub struct AnalyserRegistry {
    factories: BTreeMap<String, AnalyserFactory>,
}

impl AnalyserRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with every analyser shipped in this crate
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(HoltWintersAnalyser::KEY, build_holt_winters);
        registry
    }

    /// Adds or replaces the factory for `key`.
    pub fn register(&mut self, key: &str, factory: AnalyserFactory) {
        self.factories.insert(key.to_string(), factory);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, spec: &AnalyserSpec) -> Result<Box<dyn Analyser>, AnalyserError> {
        let factory = self
            .factories
            .get(&spec.key)
            .ok_or_else(|| AnalyserError::UnknownAnalyser(spec.key.clone()))?;
        factory(&spec.config)
    }
}

fn build_holt_winters(config: &serde_json::Value) -> Result<Box<dyn Analyser>, AnalyserError> {
    Ok(Box::new(HoltWintersAnalyser::from_json(config)?))
}

impl Default for AnalyserRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

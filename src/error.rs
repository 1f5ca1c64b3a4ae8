//! Error types shared by the analysers, the registry and the config loader.

/// Errors produced while training or building an analyser
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyserError {
    /// Fewer usable samples than the model needs (two full seasons)
    InsufficientData { required: usize, actual: usize },
    /// Input violated the producer contract (bad timestamp, non-finite value)
    InvalidObservation(String),
    /// The fitted model produced NaN or infinite predictions
    NonFiniteForecast,
    UnknownAnalyser(String),
    InvalidConfig(String),
}

impl std::fmt::Display for AnalyserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData { required, actual } => write!(
                f,
                "Insufficient data: {} buckets required, {} available",
                required, actual
            ),
            Self::InvalidObservation(e) => write!(f, "Invalid observation: {}", e),
            Self::NonFiniteForecast => write!(f, "Forecast contains non-finite values"),
            Self::UnknownAnalyser(key) => write!(f, "Unknown analyser: {}", key),
            Self::InvalidConfig(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for AnalyserError {}

/// Errors raised while loading a monitor configuration
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Analyser(AnalyserError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read config: {}", e),
            Self::Parse(e) => write!(f, "Failed to parse config: {}", e),
            Self::Analyser(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Analyser(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

impl From<AnalyserError> for ConfigError {
    fn from(e: AnalyserError) -> Self {
        Self::Analyser(e)
    }
}

pub mod bucket;
pub mod holtwinters;
pub mod interpolate;
pub mod kalman;

// Re-exports for convenience
pub use bucket::{Bucket, TimeBucketer};
pub use holtwinters::{HoltWinters, SeasonalMode, SmoothingCoefficients};
pub use kalman::{KalmanFilter, NoiseParams};

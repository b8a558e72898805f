//! Error types for configuration and simulation.

use thiserror::Error;

/// Fatal misuse of the engine. These are programmer/configuration errors and
/// are never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// `simulate` was called without any ball.
    #[error("at least one ball is required")]
    NoBalls,

    /// More balls than the engine can simulate together.
    #[error("at most 2 balls are supported, got {0}")]
    TooManyBalls(usize),

    /// A required geometry value is not a usable number.
    #[error("invalid geometry: {field} = {value}")]
    InvalidGeometry {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was rejected.
        value: f64,
    },
}

impl EngineError {
    /// Rejects NaN, infinities and negative lengths.
    pub fn check_length(field: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(Self::InvalidGeometry { field, value })
        }
    }

    /// Rejects anything outside `[0, 1]`.
    pub fn check_ratio(field: &'static str, value: f64) -> Result<(), Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(Self::InvalidGeometry { field, value })
        }
    }

    /// Rejects NaN, infinities, zero and negative lengths.
    pub fn check_positive(field: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(Self::InvalidGeometry { field, value })
        }
    }

    /// Rejects NaN and infinities.
    pub fn check_finite(field: &'static str, value: f64) -> Result<(), Self> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(Self::InvalidGeometry { field, value })
        }
    }
}

/// Errors raised while loading a game configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but describes an unusable table.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Launch settings are out of range.
    #[error("invalid launch config: {0}")]
    Launch(String),

    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

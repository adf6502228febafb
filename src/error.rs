//! Error types for the fusion engine.
//!
//! Validation errors are raised at the point of entry, before any shared
//! state is touched. Configuration errors are only ever produced while the
//! engine is being built.

use thiserror::Error;

/// Errors surfaced by the fusion core.
#[derive(Debug, Error)]
pub enum FusionError {
    /// The emotion label is not part of the fixed catalog.
    #[error("Unknown emotion: {0}")]
    UnknownEmotion(String),

    /// Intensity outside `[0, 1]` (or not a finite number).
    #[error("Invalid intensity {0}: expected a value within [0, 1]")]
    InvalidIntensity(f64),

    /// Configuration values that violate their invariants.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FusionError {
    /// Whether the error was caused by caller input (as opposed to startup).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FusionError::UnknownEmotion(_) | FusionError::InvalidIntensity(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FusionError>;

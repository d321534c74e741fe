use std::path::PathBuf;
use thiserror::Error;

/// Failures raised inside an automation run.
///
/// `Capture` and `DetectionFailed` are transient and retried locally;
/// everything else escalates to the controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Game window not found: {0}")]
    WindowNotFound(String),

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("No piece pair detected: {0}")]
    DetectionFailed(String),

    #[error("Pair reading did not stabilise: {0}")]
    ValidationFailed(String),

    #[error("Recognizer error: {0}")]
    Recognizer(String),

    #[error("Input rejected: {0}")]
    Input(String),

    #[error("Stop requested")]
    Interrupted,
}

impl EngineError {
    /// True for conditions worth another attempt inside a retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Capture(_) | EngineError::DetectionFailed(_))
    }
}

/// Configuration and reference-asset errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration in {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("{key} = {value} is outside the accepted range {min}..={max}")]
    OutOfRange {
        key: String,
        value: f64,
        min: u64,
        max: u64,
    },

    #[error("Failed to write configuration to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load swatch image {}: {message}", path.display())]
    Asset { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::Capture("minimized".into()).is_retryable());
        assert!(EngineError::DetectionFailed("no pivot".into()).is_retryable());
        assert!(!EngineError::Interrupted.is_retryable());
        assert!(!EngineError::WindowNotFound("gone".into()).is_retryable());
        assert!(!EngineError::Recognizer("bad frame".into()).is_retryable());
        assert!(!EngineError::Input("SendInput blocked".into()).is_retryable());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = ConfigError::OutOfRange {
            key: "left_click_hold_ms".into(),
            value: -5.0,
            min: 0,
            max: 10000,
        };
        assert_eq!(
            err.to_string(),
            "left_click_hold_ms = -5 is outside the accepted range 0..=10000"
        );
    }
}

//! Error types for ezbhddm.
//!
//! Taxonomy:
//! - Expected failures: bad configuration, invalid priors, unreadable checkpoints
//! - Infrastructure failures: the estimation engine or the generator gave up
//! - Invariant violations: programmer errors (e.g. sampling data before parameters)

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for ezbhddm.
#[derive(Debug, Error)]
pub enum SimError {
    // ═══════════════════════════════════════════════════════════════════
    // EXPECTED: caller supplied something unusable
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid prior: {0}")]
    InvalidPrior(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // INFRASTRUCTURE: an external collaborator failed
    // ═══════════════════════════════════════════════════════════════════

    #[error("Estimation engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Response-time generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // INVARIANT VIOLATED: bug in the caller, not recoverable
    // ═══════════════════════════════════════════════════════════════════

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by an estimation engine for a single fit.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to launch engine '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine workspace error: {context}")]
    Workspace {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Model failed to compile: {message}")]
    Compile { message: String },

    #[error("Engine runtime error: {message}")]
    Runtime { message: String },

    #[error("Engine exceeded time budget of {0:?}")]
    Timeout(Duration),

    #[error("Engine produced no output: {0}")]
    MissingOutput(String),

    #[error("Malformed engine output: {0}")]
    MalformedOutput(String),

    #[error("Monitored parameter missing from draws: {0}")]
    MissingMonitor(String),

    #[error("Fit failed after {attempts} attempts: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: String },
}

/// Failures reported by a response-time generator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("Invalid generator parameters (bound={bound}, drift={drift}, nondt={nondt}, n={n})")]
    InvalidParameters {
        bound: f64,
        drift: f64,
        nondt: f64,
        n: usize,
    },

    #[error("No correct responses in {attempts} simulated batches")]
    NoCorrectResponses { attempts: usize },
}

impl SimError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl EngineError {
    /// Check if a fresh attempt (new initial values, new engine process) may succeed.
    ///
    /// Runtime errors cover bad initial values and numerical trouble during
    /// sampling; compile errors and malformed output will fail identically again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Runtime { .. } | Self::Timeout(_))
    }
}

/// Result type alias for ezbhddm.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_engine_errors() {
        assert!(EngineError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(EngineError::Runtime {
            message: "Invalid parent values".to_string()
        }
        .is_retryable());
        assert!(!EngineError::Compile {
            message: "syntax error".to_string()
        }
        .is_retryable());
        assert!(!EngineError::MissingMonitor("betaweight".to_string()).is_retryable());
    }

    #[test]
    fn test_io_error_context() {
        let err = SimError::io(
            "opening checkpoint",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "IO error: opening checkpoint");
    }
}

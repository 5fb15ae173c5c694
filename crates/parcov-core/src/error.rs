//! Error types for coverage aggregation

use thiserror::Error;

/// Errors raised while aggregating executor results or relaying to reporters.
///
/// Every aggregation error is fatal to the current run: the coordinator stops
/// forwarding coverage for that run and surfaces the error to its caller.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// The combiner was asked to merge a file that no executor contributed.
    #[error("invariant violation: attempted to combine coverage for {path} from 2 empty sources")]
    InvariantViolation { path: String },

    #[error("duplicate completion: executor {executor} of browser {browser} already reported a result")]
    DuplicateCompletion { browser: String, executor: String },

    #[error("incomplete aggregate: browser {browser} still has {pending} unfinished executor(s)")]
    IncompleteAggregate { browser: String, pending: usize },

    #[error("unknown reporter: {0}")]
    UnknownReporter(String),

    #[error("reporter:{reporter} failed during exit: {message}")]
    ReporterExit { reporter: String, message: String },

    #[error("reporter:{reporter} dropped its exit handle without signalling completion")]
    ExitAbandoned { reporter: String },

    #[error("run aborted: {reason}")]
    RunAborted { reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AggregationError {
    /// Whether this error poisons the remainder of the current run.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            AggregationError::InvariantViolation { .. }
                | AggregationError::DuplicateCompletion { .. }
                | AggregationError::IncompleteAggregate { .. }
        )
    }
}

/// Errors produced while loading or validating `ParallelOptions`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("executors must be a positive integer, got {0}")]
    InvalidExecutors(usize),

    #[error("coverage reporter listed more than once: {0}")]
    DuplicateReporter(String),

    #[error("coverage reporter name must not be empty")]
    EmptyReporterName,
}

/// Result type for aggregation operations
pub type Result<T> = std::result::Result<T, AggregationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_completion_display() {
        let err = AggregationError::DuplicateCompletion {
            browser: "Chrome".to_string(),
            executor: "1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Chrome"));
        assert!(msg.contains("executor 1"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AggregationError::InvariantViolation {
            path: "a.js".to_string()
        }
        .is_fatal_to_run());
        assert!(AggregationError::IncompleteAggregate {
            browser: "Chrome".to_string(),
            pending: 1
        }
        .is_fatal_to_run());
        assert!(!AggregationError::UnknownReporter("html".to_string()).is_fatal_to_run());
        assert!(!AggregationError::ExitAbandoned {
            reporter: "lcov".to_string()
        }
        .is_fatal_to_run());
    }

    #[test]
    fn test_config_error_wraps() {
        let err: AggregationError = ConfigError::InvalidExecutors(0).into();
        assert!(err.to_string().contains("configuration error"));
        assert!(err.to_string().contains("got 0"));
    }
}

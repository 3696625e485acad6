//! Error taxonomy for the validation pipeline.
//!
//! Four kinds cover every failure the pipeline can see: bad input
//! (`Validation`), database failure (`Storage`), downstream service failure
//! (`External`, tagged with the system that failed), and domain-rule or
//! parse violations (`Business`). Each carries the operation that was in
//! flight when it failed.

use thiserror::Error;

/// Downstream system tag carried by external errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSystem {
    PlaceLookup,
    Model,
}

impl std::fmt::Display for ExternalSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalSystem::PlaceLookup => write!(f, "place-lookup"),
            ExternalSystem::Model => write!(f, "model"),
        }
    }
}

/// Pipeline-wide error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed during {operation}: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },

    #[error("storage failure during {operation}")]
    Storage {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{system} service failure during {operation}")]
    External {
        system: ExternalSystem,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("business rule violated during {operation}: {message}")]
    Business {
        operation: &'static str,
        message: String,
    },

    /// Back-pressure signal from the worker pool; the caller should retry
    /// later rather than block.
    #[error("validation queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

impl PipelineError {
    pub fn validation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            operation,
            message: message.into(),
        }
    }

    pub fn storage(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Storage {
            operation,
            source: source.into(),
        }
    }

    pub fn external(
        system: ExternalSystem,
        operation: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::External {
            system,
            operation,
            source: source.into(),
        }
    }

    pub fn business(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Business {
            operation,
            message: message.into(),
        }
    }

    /// True for failures of the place-lookup or model services.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External { .. })
    }
}

/// Result alias used across the pipeline.
pub type PipelineResult<T> = Result<T, PipelineError>;

//! Error taxonomy for the pipeline (§7).
//!
//! Every external-facing failure mode is a named variant so callers can match
//! on kind instead of grepping error strings, but day-to-day propagation goes
//! through `anyhow::Result` (`PipelineResult`) the way the teacher's scrapers
//! and signal storage propagate errors.

use std::fmt;

pub type Result<T> = anyhow::Result<T>;

#[derive(Debug)]
pub enum PipelineError {
    Configuration {
        message: String,
        config_key: Option<String>,
    },
    Database {
        message: String,
        operation: String,
        collection: Option<String>,
    },
    ExternalApi {
        message: String,
        api_name: String,
        status_code: Option<u16>,
    },
    EventPublish {
        message: String,
        event_name: String,
    },
    Validation {
        message: String,
        field: String,
        value: String,
    },
    CircuitOpen {
        breaker_name: String,
        retry_after_secs: f64,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Configuration { message, config_key } => {
                write!(f, "configuration error: {message}")?;
                if let Some(key) = config_key {
                    write!(f, " (key={key})")?;
                }
                Ok(())
            }
            PipelineError::Database { message, operation, collection } => {
                write!(f, "database error during {operation}: {message}")?;
                if let Some(c) = collection {
                    write!(f, " (collection={c})")?;
                }
                Ok(())
            }
            PipelineError::ExternalApi { message, api_name, status_code } => {
                write!(f, "external API '{api_name}' error: {message}")?;
                if let Some(code) = status_code {
                    write!(f, " (status={code})")?;
                }
                Ok(())
            }
            PipelineError::EventPublish { message, event_name } => {
                write!(f, "failed to publish event '{event_name}': {message}")
            }
            PipelineError::Validation { message, field, value } => {
                write!(f, "validation error on field '{field}' (value={value}): {message}")
            }
            PipelineError::CircuitOpen { breaker_name, retry_after_secs } => {
                write!(
                    f,
                    "circuit breaker '{breaker_name}' is open, retry in {retry_after_secs:.1}s"
                )
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, PipelineError::CircuitOpen { .. })
    }

    /// Whether the retry wrapper is allowed to retry this kind of failure.
    /// `CircuitOpen` is a first-class outcome; `Validation` is a poison
    /// payload no amount of retrying will fix; `Configuration`/`Database`
    /// are fatal-at-the-call-site kinds, not transient ones. Only
    /// `ExternalApi`/`EventPublish` are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::CircuitOpen { .. }
            | PipelineError::Validation { .. }
            | PipelineError::Configuration { .. }
            | PipelineError::Database { .. } => false,
            PipelineError::ExternalApi { .. } | PipelineError::EventPublish { .. } => true,
        }
    }
}

/// Downcasts a type-erased error back to `PipelineError` to consult
/// `is_retryable`, defaulting to `true` for anything that isn't one of ours
/// (e.g. a raw `reqwest`/`redis` error wrapped only in `anyhow::Context`).
pub fn is_retryable_anyhow(err: &anyhow::Error) -> bool {
    err.downcast_ref::<PipelineError>().map(PipelineError::is_retryable).unwrap_or(true)
}

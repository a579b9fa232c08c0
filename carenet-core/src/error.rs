use thiserror::Error;
use sqlx::Error as SqlxError;
use serde_json::Error as JsonError;
use prometheus::Error as PrometheusError;
use std::io::Error as IoError;
use std::time::Duration;

#[derive(Error, Debug)]
pub enum CarenetError {
    #[error("Storage error: {0}")]
    Storage(#[from] SqlxError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] JsonError),

    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] PrometheusError),

    #[error("{kind} {key} not found")]
    RootNotFound { kind: &'static str, key: String },

    #[error("Dependency {dependency} unavailable: {reason}")]
    DependencyUnavailable { dependency: String, reason: String },

    #[error("Dependency {dependency} did not answer within {timeout:?}")]
    DependencyTimeout { dependency: String, timeout: Duration },

    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl CarenetError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        CarenetError::RootNotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn unavailable(dependency: impl Into<String>, reason: impl ToString) -> Self {
        CarenetError::DependencyUnavailable {
            dependency: dependency.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<anyhow::Error> for CarenetError {
    fn from(err: anyhow::Error) -> Self {
        CarenetError::Unknown(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CarenetError>;

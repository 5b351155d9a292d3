//! Orchestrator-wide error kind, shared by every core component.
//!
//! Mirrors the layered error translation the rest of this codebase uses
//! (a narrow adapter error folded into a single top-level enum); the
//! HTTP-status mapping lives in the server crate, which is the only
//! place that knows about status codes.

use crate::runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("missing or invalid bearer token")]
    AuthError,

    #[error("no free ports in range {0}")]
    PortExhausted(&'static str),

    #[error("runtime daemon error (retryable): {0}")]
    RuntimeTransient(String),

    #[error("runtime daemon error (fatal): {0}")]
    RuntimeFatal(String),

    #[error("container did not reach running state within {0}s")]
    StartupTimeout(u64),

    #[error("container exited before reaching running state: {0}")]
    StartupFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),
}

impl From<RuntimeError> for OrchestratorError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotFound(id) => OrchestratorError::NotFound(format!("container {id}")),
            RuntimeError::Conflict(msg) => OrchestratorError::RuntimeFatal(msg),
            RuntimeError::Transient(msg) => OrchestratorError::RuntimeTransient(msg),
            RuntimeError::Fatal(msg) => OrchestratorError::RuntimeFatal(msg),
        }
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        OrchestratorError::PersistenceError(err.to_string())
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

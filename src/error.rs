use uuid::Uuid;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrecomputeError {
    /// A required credential or setting is missing. Fatal at call time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The external completion call failed or returned a non-success status.
    #[error("upstream completion failed: {0}")]
    Upstream(String),

    /// The upstream response did not have the expected shape.
    #[error("unexpected upstream response: {0}")]
    Schema(String),

    /// A second job was submitted while one is already running.
    #[error("another job is already running")]
    JobConflict,

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// The job exists but its status does not permit the requested operation.
    #[error("invalid job state: {0}")]
    InvalidJobState(String),

    /// Explanation derivation failed.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PrecomputeError>;

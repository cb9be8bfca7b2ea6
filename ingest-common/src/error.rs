//! Common error types shared by every pipeline component.

use thiserror::Error;

/// Common result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared across the ingestion pipeline daemon.
///
/// Most file-level failures are logged and skipped by the caller rather
/// than propagated as this type; the conditions that must change control
/// flow (staging exhaustion, lock contention) get their own variants so
/// callers can match on them instead of inspecting strings.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("staging area full")]
    StagingFull,

    #[error("pipeline lock held by another process")]
    LockContended,

    #[error("internal error: {0}")]
    Internal(String),
}

//! Error types for winemason

use std::path::PathBuf;
use thiserror::Error;

/// Winemason result type
pub type Result<T> = std::result::Result<T, WinemasonError>;

/// Main error type for winemason operations
#[derive(Error, Debug)]
pub enum WinemasonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("prefix {path:?} is outside the home directory {home:?}")]
    BoundaryViolation { path: PathBuf, home: PathBuf },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("corrupt prefix state: {0}")]
    CorruptState(String),

    #[error("registry read failed for {key}\\{value}: {error}")]
    RegistryRead {
        key: String,
        value: String,
        error: String,
    },

    #[error("registry write failed for {key}\\{value}: {error}")]
    RegistryWrite {
        key: String,
        value: String,
        error: String,
    },

    #[error("command execution failed: {command} - {error}")]
    CommandExecution { command: String, error: String },

    #[error("user lookup failed: {0}")]
    User(String),

    #[error("download error: {0}")]
    Download(String),

    #[error("checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: String, got: String },

    #[error("machine error: {0}")]
    Machine(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

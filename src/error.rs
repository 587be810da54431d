//! Error types for rebroadcast
//!
//! The cache itself only surfaces `ReplayError`; everything above it
//! (config, CLI, IO) uses `RebroadcastResult<T>`.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for application-level operations
pub type RebroadcastResult<T> = Result<T, RebroadcastError>;

/// Errors a cursor can report
///
/// `Producer` is the producer's own failure, captured once and handed to
/// every consumer that asks afterwards. All clones share the same `Arc`.
#[derive(Error, Debug)]
pub enum ReplayError<E> {
    #[error("producer failed: {0}")]
    Producer(Arc<E>),

    #[error("no tokio runtime available to drive the producer")]
    NoRuntime,

    #[error("producer driver stopped before the sequence finished")]
    DriverLost,
}

impl<E> ReplayError<E> {
    /// Whether this is the producer's own failure
    pub fn is_producer_failure(&self) -> bool {
        matches!(self, Self::Producer(_))
    }

    /// The underlying producer error, if any
    pub fn producer_error(&self) -> Option<&E> {
        match self {
            Self::Producer(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl<E> Clone for ReplayError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Producer(e) => Self::Producer(Arc::clone(e)),
            Self::NoRuntime => Self::NoRuntime,
            Self::DriverLost => Self::DriverLost,
        }
    }
}

/// All errors that can occur outside the cache core
#[derive(Error, Debug)]
pub enum RebroadcastError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Replay errors
    #[error("Event stream failed: {0}")]
    Replay(String),

    #[error("Consumers disagreed at event {index}")]
    Divergence { index: usize },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RebroadcastError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: rebroadcast config init --force"),
            Self::PathNotFound(_) => Some("Pass a readable file, or pipe the stream on stdin"),
            _ => None,
        }
    }
}

impl<E: std::fmt::Display> From<ReplayError<E>> for RebroadcastError {
    fn from(err: ReplayError<E>) -> Self {
        Self::Replay(err.to_string())
    }
}

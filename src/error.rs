//! Error taxonomy shared by the scheduling and playback components.
//!
//! Per-entry and per-clip errors are recovered where they occur and logged.
//! Only `SyncError` and `CatalogError` are meant to reach an API caller.

use std::path::PathBuf;
use thiserror::Error;

/// A cron expression that failed validation. The owning entry is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "cron expression must have exactly 5 fields (minute hour day month day_of_week), got {found}"
    )]
    FieldCount { found: usize },

    #[error("invalid {field} field '{value}'")]
    FieldSyntax { field: &'static str, value: String },

    #[error("{field} value {value} is outside {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("invalid step in {field} field '{value}': step must be a positive integer")]
    InvalidStep { field: &'static str, value: String },
}

impl ValidationError {
    /// Name of the offending field, if the error is field-specific.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::FieldCount { .. } => None,
            ValidationError::FieldSyntax { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidStep { field, .. } => Some(field),
        }
    }
}

/// A clip referenced by a sequence does not exist under the clip root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing audio file: {}", path.display())]
pub struct ResolutionError {
    pub path: PathBuf,
}

/// Failure of the audio output or of the playback pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("cannot open '{}': {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("cannot decode '{}': {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("playback queue is full ({capacity} pending), announcement dropped")]
    QueueFull { capacity: usize },

    #[error("playback workers have shut down")]
    ShutDown,
}

/// Schedule document could not be read or written.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read schedule '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schedule document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failed to persist schedule '{}': {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A manually triggered announcement references something unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid {field} '{value}': ids cannot contain path separators or '..'")]
    InvalidId { field: &'static str, value: String },

    #[error("Invalid {field} '{value}'. Available: {}", available.join(", "))]
    Unknown {
        field: &'static str,
        value: String,
        available: Vec<String>,
    },
}

/// Settings file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read settings '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings '{}': {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

//! Domain errors for the packaging pipeline.
//!
//! Precondition failures (bad paths, an existing AIP root) and metadata
//! validation failures are typed here. Per-item transfer failures never
//! surface as errors; they are recorded in the transfer record instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PackagerError>;

#[derive(Debug, Error)]
pub enum PackagerError {
    #[error("Can't find {role}: {}", path.display())]
    InvalidPath { role: &'static str, path: PathBuf },

    #[error("AIP destination '{}' already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Invalid account identifier '{value}': {reason}")]
    InvalidAccountId { value: String, reason: &'static str },

    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    #[error("Missing required key: {field}")]
    MissingField { field: &'static str },

    #[error("Key 'type' has illegal value '{value}'; must be one of: agent, event, object")]
    InvalidType { value: String },

    #[error("Invalid event entry: {reason}")]
    InvalidEntry { reason: String },

    #[error("Search term '{pattern}' is invalid")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to load events log {}: {reason}", path.display())]
    EventsLog { path: PathBuf, reason: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl PackagerError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

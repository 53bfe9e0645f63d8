//! Error types for the events feed.

use crate::types::Timestamp;
use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agency not found: {0}")]
    AgencyNotFound(String),

    #[error("No pages published for agency: {0}")]
    NoPages(String),

    #[error("Page not found for agency {agency} at {timestamp}")]
    PageNotFound { agency: String, timestamp: Timestamp },

    #[error("Page timestamp {timestamp} does not advance the log for agency {agency}")]
    StalePageTimestamp { agency: String, timestamp: Timestamp },

    #[error("Too far out of sync: last sync {last_sync} is older than the {window_ms} ms staleness window")]
    OutOfSync { last_sync: Timestamp, window_ms: i64 },

    #[error("Invalid agency name: {0:?}")]
    InvalidAgency(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid storage format: {0}")]
    InvalidFormat(String),

    #[error("Storage is locked by another process")]
    Locked,

    #[error("Subscriber dropped")]
    SubscriberDropped,
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

//! Error types for the profile view core

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::UserId;

/// Which read a fetch failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Profile,
    FeedPage,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Profile => f.write_str("profile"),
            Resource::FeedPage => f.write_str("feed page"),
        }
    }
}

/// Failures reported by a [`crate::ProfileApi`] implementation
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Remote procedure failed ({code}): {message}")]
    Remote { code: String, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Profile identifier is missing")]
    MissingIdentifier,

    #[error("Failed to fetch {resource}: {source}")]
    FetchFailure {
        resource: Resource,
        #[source]
        source: ApiError,
    },

    #[error("Follow toggle for {user_id} failed and was rolled back: {source}")]
    MutationFailure {
        user_id: UserId,
        #[source]
        source: ApiError,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn fetch(resource: Resource, source: ApiError) -> Self {
        SyncError::FetchFailure { resource, source }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::MissingIdentifier => "missing_identifier",
            SyncError::FetchFailure { .. } => "fetch_failure",
            SyncError::MutationFailure { .. } => "mutation_failure",
            SyncError::Timeout { .. } => "timeout",
            SyncError::Config(_) => "config",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

//! Typed error hierarchy for stream creation tracking.
//!
//! `TrackerError` covers everything that can end (or be recovered from) during
//! a stream creation job:
//! - `Validation`: bad input, rejected before any network call
//! - `Transport` / `Http`: request or poll-tick failures
//! - `ChannelTimeout`: the live channel never came up
//! - `Job`: the backend reported a failure for the job
//! - `OverallTimeout`: the absolute ceiling elapsed

use serde::Serialize;
use thiserror::Error;

pub const CONNECT_TIMEOUT_MESSAGE: &str = "Connection timed out. Stream may still be creating.";
pub const OVERALL_TIMEOUT_MESSAGE: &str =
    "Status updates timed out. Please check the streams list to see if creation was successful.";
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid stream data provided";
pub const CREATE_FAILED_MESSAGE: &str = "Failed to start stream creation";

/// Errors from submitting or tracking a stream creation job.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{0}")]
    Validation(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Backend returned {status}{}", detail(.message))]
    Http { status: u16, message: Option<String> },

    #[error("Connection timed out. Stream may still be creating.")]
    ChannelTimeout,

    #[error("{0}")]
    Job(String),

    #[error(
        "Status updates timed out. Please check the streams list to see if creation was successful."
    )]
    OverallTimeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

/// Copyable classification of a [`TrackerError`], stored in the state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    ChannelTimeout,
    Job,
    OverallTimeout,
}

impl TrackerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::Validation(_) => ErrorKind::Validation,
            TrackerError::Transport(_) | TrackerError::Http { .. } | TrackerError::Other(_) => {
                ErrorKind::Transport
            }
            TrackerError::ChannelTimeout => ErrorKind::ChannelTimeout,
            TrackerError::Job(_) => ErrorKind::Job,
            TrackerError::OverallTimeout => ErrorKind::OverallTimeout,
        }
    }

    /// Message shown to the user when submission fails before a job exists.
    ///
    /// Prefers the backend's own `message`, then falls back to a generic line for
    /// transport problems.
    pub fn submission_message(&self) -> String {
        match self {
            TrackerError::Http {
                message: Some(m), ..
            } => m.clone(),
            TrackerError::Http { message: None, .. }
            | TrackerError::Transport(_)
            | TrackerError::Other(_) => CREATE_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TrackerError::Http {
                status: status.as_u16(),
                message: None,
            },
            None => TrackerError::Transport(err.to_string()),
        }
    }
}

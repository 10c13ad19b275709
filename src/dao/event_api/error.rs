//! Failures surfaced by the remote event API client.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`FetchError`] failures.
pub type FetchResult<T> = Result<T, FetchError>;

/// Failures that can occur while talking to the event API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The API answered 429 and asked us to come back later.
    #[error("rate limited by the event API, retry in {}s", retry_after.as_secs())]
    RateLimited {
        retry_after: Duration,
        message: Option<String>,
    },
    /// The API answered with a non-success status other than 429.
    #[error("event API returned status {status} for `{path}`")]
    Status {
        path: String,
        status: StatusCode,
        message: Option<String>,
    },
    /// The request never produced a response.
    #[error("failed to reach the event API at `{path}`")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The body could not be decoded into the expected shape.
    #[error("failed to decode event API response for `{path}`")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// The body decoded but breaks the event window invariant.
    #[error("event API returned an inconsistent record for `{path}`: {reason}")]
    InvalidRecord { path: String, reason: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build event API client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Human readable text stored in a snapshot after a failed attempt.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::RateLimited {
                message: Some(message),
                ..
            }
            | FetchError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}

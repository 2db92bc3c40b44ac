//! Error types for mocap-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (HTTP, export, credential, state store)
//! - Context information (status code, URL, poll budget)
//! - The transient/fatal split consumed by the retry layer ([`crate::retry`])

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for mocap-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mocap-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "output_dir")
        key: Option<String>,
    },

    /// Bearer credential file is missing
    #[error("bearer token not found at {}: authenticate and save the token there", .0.display())]
    MissingCredential(PathBuf),

    /// Network error (connect failure, timeout, body read failure)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote API returned a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http {
        /// The HTTP status code returned by the remote API
        status: u16,
        /// The URL that produced the status
        url: String,
    },

    /// Remote payload was missing a required field or had an unexpected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Remote export job reported a terminal `failed` status
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// Export job did not reach a terminal status before the configured poll budget
    #[error("export still pending after {elapsed:?}, giving up")]
    PollTimeout {
        /// Time spent polling before giving up
        elapsed: Duration,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State snapshot could not be loaded or persisted
    #[error("state store error: {0}")]
    StateStore(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::Http`] from a response's status and URL.
    pub(crate) fn from_status(status: reqwest::StatusCode, url: &url::Url) -> Self {
        Error::Http {
            status: status.as_u16(),
            url: url.to_string(),
        }
    }
}

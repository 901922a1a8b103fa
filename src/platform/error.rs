//! Error types for platform operations.
//!
//! Every variant carries the name of the operation that failed so that a
//! logged error reads on its own ("reserve failed with HTTP 500").

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to the platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error during {operation}: {source}")]
    Network {
        /// Operation that was in flight.
        operation: &'static str,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request did not complete within the configured timeout.
    #[error("timeout during {operation}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
    },

    /// The platform answered with a status the operation does not accept.
    #[error("{operation} failed with HTTP {status}")]
    HttpStatus {
        /// Operation that received the status.
        operation: &'static str,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body did not have the expected shape.
    #[error("{operation} returned unexpected content: {reason}")]
    Parse {
        /// Operation whose response could not be parsed.
        operation: &'static str,
        /// What was missing or malformed.
        reason: String,
    },

    /// Login was rejected or the session could not be verified.
    #[error("[AUTH] authentication failed: {reason}")]
    Auth {
        /// Why authentication failed.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Client construction panicked even without system proxy lookup.
    #[error("HTTP client construction panicked while initializing networking")]
    ClientBuildPanicked,

    /// Local session credential file could not be read or written.
    #[error("session store error at {path}: {source}")]
    SessionStore {
        /// Session file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl PlatformError {
    /// Maps a reqwest error, distinguishing timeouts from other network failures.
    pub fn from_reqwest(operation: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { operation }
        } else {
            Self::Network { operation, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(operation: &'static str, status: u16) -> Self {
        Self::HttpStatus { operation, status }
    }

    /// Creates a parse error.
    pub fn parse(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates an authentication error.
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    /// Creates a session store IO error.
    pub fn session_store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SessionStore {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures that mean the current run cannot continue
    /// without fresh credentials.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

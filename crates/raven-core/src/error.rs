//! Watch-level error types.

use thiserror::Error;

/// Errors that can end a watch loop.
///
/// Malformed lines and non-object payloads are not errors; they surface as
/// [`DecodeOutcome`](crate::event::DecodeOutcome) variants and are dropped.
#[derive(Debug, Error)]
pub enum WatchError {
    /// HTTP request failed (connection refused, TLS, body read, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The watch endpoint answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// A resource handler failed while translating an event.
    #[error("Handler error for '{resource}': {reason}")]
    Handler { resource: String, reason: String },

    /// Invalid watcher or source configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The dispatch queue worker terminated unexpectedly.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Returns `true` if the failure happened below the decode layer
    /// (connect, TLS, status, body read).
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }

    /// Returns `true` if a handler raised the error.
    pub fn is_handler_error(&self) -> bool {
        matches!(self, Self::Handler { .. })
    }

    /// Convenience constructor for handler failures.
    pub fn handler(resource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Handler {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connection_errors() {
        assert!(WatchError::Http("refused".into()).is_connection_error());
        assert!(WatchError::Status { status: 500, url: "u".into() }.is_connection_error());
        assert!(!WatchError::handler("pods", "boom").is_connection_error());
        assert!(WatchError::handler("pods", "boom").is_handler_error());
    }

    #[test]
    fn status_display() {
        let e = WatchError::Status {
            status: 403,
            url: "http://k8s/api/v1/pods?watch=true".into(),
        };
        assert_eq!(e.to_string(), "HTTP 403 from http://k8s/api/v1/pods?watch=true");
    }
}

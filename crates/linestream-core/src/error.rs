//! Stream error taxonomy

use std::time::Duration;

use thiserror::Error;

use crate::error_info::{describe_status, ServerErrorInfo};
use crate::request::GrantType;

/// Errors that end a stream or prevent it from starting
///
/// `Clone` so the same value can be attached to the final state change
/// notification and returned from `start()`.
#[derive(Debug, Error, Clone)]
pub enum StreamError {
    #[error("no credentials were supplied for the stream request")]
    MissingCredentials,

    #[error("credentials are not set up for {required} access")]
    UnauthorizedCredentials { required: GrantType },

    #[error("no data received from {url} for {after:?}; the stream stalled")]
    Timeout { url: String, after: Duration },

    #[error("stream transport failed{}: {message}", status_suffix(*status))]
    Transport { status: Option<u16>, message: String },

    #[error("server reported an error{}: {}", status_suffix(*status), info.summary())]
    Server {
        status: Option<u16>,
        info: ServerErrorInfo,
    },

    #[error("stream is already running")]
    AlreadyRunning,

    #[error("invalid stream configuration: {0}")]
    Config(String),
}

fn status_suffix(status: Option<u16>) -> String {
    match status {
        Some(code) => match describe_status(code) {
            Some(description) => format!(" (HTTP {} {})", code, description),
            None => format!(" (HTTP {})", code),
        },
        None => String::new(),
    }
}

impl StreamError {
    pub fn timeout(url: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            url: url.into(),
            after,
        }
    }

    pub fn transport<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Server error built from a raw payload
    pub fn server(status: Option<u16>, payload: &str) -> Self {
        Self::Server {
            status,
            info: ServerErrorInfo::from_payload(payload),
        }
    }

    /// Creates a transport error from a reqwest error
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let status = error.status().map(|s| s.as_u16());
        Self::transport(status, error.to_string())
    }

    /// Credential problems are reported before any connection attempt
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            StreamError::MissingCredentials | StreamError::UnauthorizedCredentials { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StreamError::Timeout { .. })
    }

    /// Last HTTP status known when the error was raised
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StreamError::Transport { status, .. } | StreamError::Server { status, .. } => *status,
            _ => None,
        }
    }
}

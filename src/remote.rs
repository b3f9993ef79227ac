use std::fmt;

use thiserror::Error;

/// Category of a failed call to an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Credentials missing, expired or refused.
    Authentication,
    /// Connection failed or timed out.
    Network,
    /// The service answered with an error status.
    Server,
    InvalidResponse,
    /// No collaborator is configured for this operation.
    Unconfigured,
    Mail,
}

impl RemoteErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::Server => "server",
            Self::InvalidResponse => "invalid_response",
            Self::Unconfigured => "unconfigured",
            Self::Mail => "mail",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Authentication, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Server, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InvalidResponse, message)
    }

    pub fn unconfigured(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unconfigured, message)
    }

    pub fn mail(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Mail, message)
    }

    /// Only these are worth a credential refresh and one retry.
    pub fn is_authentication(&self) -> bool {
        self.kind == RemoteErrorKind::Authentication
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::network("request timeout")
        } else if e.is_connect() {
            RemoteError::network(format!("connection failed: {e}"))
        } else if e.is_decode() {
            RemoteError::invalid_response(format!("failed to parse response: {e}"))
        } else {
            RemoteError::network(format!("request failed: {e}"))
        }
    }
}

use std::fmt;

use thiserror::Error;

/// Broad category of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The call exceeded the per-call timeout.
    Timeout,
    /// The upstream answered with a non-success status.
    Status,
    /// The upstream answered 2xx but the body could not be understood.
    Malformed,
    /// The request never completed (DNS, connect, TLS, ...).
    Transport,
    /// Credentials or base URL are missing or unusable.
    NotConfigured,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamErrorKind::Timeout => write!(f, "timeout"),
            UpstreamErrorKind::Status => write!(f, "status"),
            UpstreamErrorKind::Malformed => write!(f, "malformed"),
            UpstreamErrorKind::Transport => write!(f, "transport"),
            UpstreamErrorKind::NotConfigured => write!(f, "not_configured"),
        }
    }
}

/// Failure of a call to an external capability.
///
/// `message` is safe to show to an end user: it never contains the raw
/// upstream payload, the request URL or credentials. Diagnostic detail goes
/// to the log at the point the error is created.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl UpstreamError {
    pub fn timeout() -> Self {
        Self {
            kind: UpstreamErrorKind::Timeout,
            message: "The service is temporarily unavailable (the request timed out).".to_string(),
            status: None,
        }
    }

    pub fn status(code: u16) -> Self {
        let message = match code {
            401 | 403 => "The service rejected the configured credentials.".to_string(),
            404 => "The service could not find what was requested.".to_string(),
            429 => "The service is busy right now (rate limited).".to_string(),
            500..=599 => "The service is temporarily unavailable.".to_string(),
            other => format!("The service returned an unexpected status ({other})."),
        };
        Self {
            kind: UpstreamErrorKind::Status,
            message,
            status: Some(code),
        }
    }

    pub fn malformed() -> Self {
        Self {
            kind: UpstreamErrorKind::Malformed,
            message: "The service returned a response I couldn't understand.".to_string(),
            status: None,
        }
    }

    pub fn transport() -> Self {
        Self {
            kind: UpstreamErrorKind::Transport,
            message: "I couldn't reach the service.".to_string(),
            status: None,
        }
    }

    pub fn not_configured(what: &str) -> Self {
        Self {
            kind: UpstreamErrorKind::NotConfigured,
            message: format!("The {what} service is not configured."),
            status: None,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        // The URL carries the API key as a query parameter.
        let err = err.without_url();
        tracing::warn!(error = %err, "Upstream request failed");
        if err.is_timeout() {
            UpstreamError::timeout()
        } else if err.is_decode() {
            UpstreamError::malformed()
        } else if let Some(status) = err.status() {
            UpstreamError::status(status.as_u16())
        } else {
            UpstreamError::transport()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = UpstreamError::timeout();
        assert_eq!(err.kind, UpstreamErrorKind::Timeout);
        assert!(err.to_string().contains("temporarily unavailable"));
        assert_eq!(err.status, None);
    }

    #[test]
    fn test_status_messages() {
        let err = UpstreamError::status(503);
        assert_eq!(err.kind, UpstreamErrorKind::Status);
        assert_eq!(err.status, Some(503));
        assert!(err.message.contains("temporarily unavailable"));

        assert!(UpstreamError::status(403).message.contains("credentials"));
        assert!(UpstreamError::status(418).message.contains("418"));
    }

    #[test]
    fn test_not_configured_names_service() {
        let err = UpstreamError::not_configured("maps");
        assert_eq!(err.to_string(), "The maps service is not configured.");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(UpstreamErrorKind::NotConfigured.to_string(), "not_configured");
        assert_eq!(UpstreamErrorKind::Malformed.to_string(), "malformed");
    }
}

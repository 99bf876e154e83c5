//! Error types for pipeline operations

use api_transport::{Method, StatusCode, TransportError};

/// Why a request through the pipeline failed.
///
/// Each variant names the classification that fired, so callers can tell a
/// fatal session end from an ordinary HTTP failure. `Clone` because one
/// refresh failure is delivered to every request waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("method not allowed: {method} {url}")]
    MethodNotAllowed {
        method: Method,
        url: String,
        body: String,
    },

    /// `session_ended` is false when the blocked request was the login
    /// itself: there was no session to end.
    #[error("account blocked")]
    AccountBlocked { body: String, session_ended: bool },

    #[error("anti-forgery token rejected: {detail}")]
    AntiForgeryInvalid { detail: String },

    #[error("anti-forgery token refetch failed: {0}")]
    AntiForgeryRefetch(session_auth::Error),

    #[error("credential expired and was not accepted after refresh")]
    CredentialExpired { body: String },

    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    /// The request leading the refresh was dropped before it finished. The
    /// session is intact; the next 401 starts a new refresh.
    #[error("credential refresh abandoned before completing")]
    RefreshAbandoned,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("request failed with status {status}")]
    Status { status: StatusCode, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("credential store error: {0}")]
    Credential(#[from] session_auth::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// HTTP status behind this error, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::MethodNotAllowed { .. } => Some(StatusCode::METHOD_NOT_ALLOWED),
            Error::AccountBlocked { .. } | Error::AntiForgeryInvalid { .. } => {
                Some(StatusCode::FORBIDDEN)
            }
            Error::CredentialExpired { .. } | Error::InvalidCredentials => {
                Some(StatusCode::UNAUTHORIZED)
            }
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error ended the session (credentials cleared, login required).
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Error::RefreshFailed(_)
                | Error::AccountBlocked {
                    session_ended: true,
                    ..
                }
        )
    }

    /// Metric label for the classification that fired.
    pub fn classification(&self) -> &'static str {
        match self {
            Error::MethodNotAllowed { .. } => "method_not_allowed",
            Error::AccountBlocked { .. } => "account_blocked",
            Error::AntiForgeryInvalid { .. } => "anti_forgery_invalid",
            Error::AntiForgeryRefetch(_) => "anti_forgery_refetch",
            Error::CredentialExpired { .. } => "credential_expired",
            Error::RefreshFailed(_) => "refresh_failed",
            Error::RefreshAbandoned => "refresh_abandoned",
            Error::InvalidCredentials => "invalid_credentials",
            Error::Status { .. } => "unclassified",
            Error::Transport(_) => "transport",
            Error::Credential(_) => "credential_store",
            Error::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

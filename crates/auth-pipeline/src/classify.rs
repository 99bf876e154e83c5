//! Failure classification for API responses
//!
//! Pure decision function: given a failed response, the request that
//! produced it and the request's retry budget, decide what the pipeline
//! does next. No I/O, no shared state; the client executes the outcome.
//!
//! Decision order matters for 403: the account-blocked header wins over an
//! anti-forgery detail, which wins over a plain permission error.

use api_transport::{ApiRequest, ApiResponse};
use session_auth::constants::{ACCOUNT_BLOCKED_HEADER, is_csrf_detail};

use crate::endpoints::Endpoints;
use crate::retry::{RetryCause, RetryContext};

/// What to do with a failed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 405: log a diagnostic, propagate unchanged.
    MethodNotAllowed,
    /// 403 with the blocked-account header. The session ends unless the
    /// request was the login itself (nothing to end yet).
    AccountBlocked { end_session: bool },
    /// 403 with an anti-forgery detail. `retry` is false once the request
    /// has already been replayed after a refetch.
    AntiForgeryInvalid { detail: String, retry: bool },
    /// Any other 403: propagate unchanged.
    Forbidden,
    /// 401 from the login endpoint: bad username or password.
    LoginRejected,
    /// 401 from the refresh endpoint: the session is over.
    RefreshRejected,
    /// 401 from any other endpoint. `retry` is false once the request has
    /// already been replayed after a refresh.
    CredentialExpired { retry: bool },
    /// Anything else: propagate unchanged.
    Unclassified,
}

/// Classify a non-success response.
pub fn classify(
    response: &ApiResponse,
    request: &ApiRequest,
    retry: RetryContext,
    endpoints: &Endpoints,
) -> Outcome {
    match response.status.as_u16() {
        405 => Outcome::MethodNotAllowed,
        403 => classify_forbidden(response, request, retry, endpoints),
        401 => {
            if endpoints.is_refresh(request) {
                Outcome::RefreshRejected
            } else if endpoints.is_login(request) {
                Outcome::LoginRejected
            } else {
                Outcome::CredentialExpired {
                    retry: !retry.has_retried(RetryCause::CredentialExpired),
                }
            }
        }
        _ => Outcome::Unclassified,
    }
}

fn classify_forbidden(
    response: &ApiResponse,
    request: &ApiRequest,
    retry: RetryContext,
    endpoints: &Endpoints,
) -> Outcome {
    if is_account_blocked(response) {
        return Outcome::AccountBlocked {
            end_session: !endpoints.is_login(request),
        };
    }
    match response.detail() {
        Some(detail) if is_csrf_detail(&detail) => Outcome::AntiForgeryInvalid {
            retry: !retry.has_retried(RetryCause::AntiForgeryInvalid),
            detail,
        },
        _ => Outcome::Forbidden,
    }
}

/// Whether the server flagged the account as blocked.
pub fn is_account_blocked(response: &ApiResponse) -> bool {
    response
        .header_str(ACCOUNT_BLOCKED_HEADER)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

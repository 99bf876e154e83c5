//! Endpoint paths, header names and server signal values
//!
//! Paths are relative to the API base URL (the server mounts its routers
//! under `/api`, which belongs in the base URL). The detail strings must
//! match the server byte for byte; they are how an anti-forgery rejection is
//! told apart from any other 403.

use reqwest::Method;

/// Exchanges the refresh cookie for a new access token.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Makes the server set a fresh `csrf_token` cookie.
pub const CSRF_TOKEN_PATH: &str = "/auth/csrf-token";

/// Username/password login (form-encoded).
pub const LOGIN_PATH: &str = "/auth/login";

/// Ends the server-side session and clears its cookies.
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Returns the authenticated user's profile.
pub const CURRENT_USER_PATH: &str = "/auth/me";

/// Application route the user is sent to when the session ends.
pub const LOGIN_ROUTE: &str = "/login";

/// Request header carrying the anti-forgery token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Cookie the server stores the anti-forgery token in.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Response header marking a blocked (deactivated) account.
pub const ACCOUNT_BLOCKED_HEADER: &str = "x-account-blocked";

/// 403 detail when the anti-forgery header was not sent.
pub const CSRF_MISSING_DETAIL: &str = "CSRF token missing";

/// 403 detail when the anti-forgery header did not match the cookie.
pub const CSRF_INVALID_DETAIL: &str = "CSRF token invalid";

/// Methods the server exempts from anti-forgery checks.
pub const SAFE_METHODS: &[Method] = &[Method::GET, Method::HEAD, Method::OPTIONS];

/// Whether a request with this method needs an anti-forgery header.
pub fn is_state_changing(method: &Method) -> bool {
    !SAFE_METHODS.contains(method)
}

/// Whether a 403 `detail` value signals an anti-forgery failure.
pub fn is_csrf_detail(detail: &str) -> bool {
    detail == CSRF_MISSING_DETAIL || detail == CSRF_INVALID_DETAIL
}

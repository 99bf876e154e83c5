//! Endpoint paths the pipeline treats specially

use api_transport::ApiRequest;
use serde::Deserialize;
use session_auth::constants::{
    CSRF_TOKEN_PATH, CURRENT_USER_PATH, LOGIN_PATH, LOGIN_ROUTE, LOGOUT_PATH, REFRESH_PATH,
};

/// Auth endpoint paths (relative to the API base URL) and the login route.
///
/// Deserializable so deployments that mount the auth router elsewhere can
/// override individual paths; missing fields keep the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub refresh: String,
    pub csrf_token: String,
    pub login: String,
    pub logout: String,
    pub current_user: String,
    /// Application route the user is sent to when the session ends.
    pub login_route: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            refresh: REFRESH_PATH.into(),
            csrf_token: CSRF_TOKEN_PATH.into(),
            login: LOGIN_PATH.into(),
            logout: LOGOUT_PATH.into(),
            current_user: CURRENT_USER_PATH.into(),
            login_route: LOGIN_ROUTE.into(),
        }
    }
}

impl Endpoints {
    pub fn is_refresh(&self, request: &ApiRequest) -> bool {
        targets(request, &self.refresh)
    }

    pub fn is_login(&self, request: &ApiRequest) -> bool {
        targets(request, &self.login)
    }
}

/// Whether `request` is addressed to `endpoint`.
///
/// Suffix match so absolute URLs (`https://host/api/auth/refresh`) match the
/// base-relative endpoint path too.
fn targets(request: &ApiRequest, endpoint: &str) -> bool {
    let route = request.route().trim_end_matches('/');
    let endpoint = endpoint.trim_end_matches('/');
    !endpoint.is_empty() && (route == endpoint || route.ends_with(endpoint))
}

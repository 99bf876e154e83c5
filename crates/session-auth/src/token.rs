//! Direct token calls that bypass the request pipeline
//!
//! Both calls go straight to the transport. Running them through the
//! pipeline would let a 401 from the refresh endpoint trigger another
//! refresh, or a 403 from the token endpoint trigger another refetch.
//!
//! The refresh call sends no body: the server reads the refresh credential
//! from its HttpOnly cookie, which the transport's cookie jar supplies.

use api_transport::{ApiRequest, Transport};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

fn default_token_type() -> String {
    "bearer".into()
}

/// Body of a successful login or refresh.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Fresh anti-forgery token, when the server returns one in the body.
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// Body of the anti-forgery token endpoint.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CsrfTokenResponse {
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// Exchange the refresh cookie for a new access token.
///
/// Any non-success status is `Rejected`; the caller decides that every
/// refresh failure ends the session.
pub async fn refresh_access_token(transport: &dyn Transport, path: &str) -> Result<TokenResponse> {
    let response = transport
        .send(&ApiRequest::post(path))
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    if !response.is_success() {
        return Err(Error::Rejected {
            status: response.status.as_u16(),
            body: response.text(),
        });
    }

    let token: TokenResponse = response
        .json()
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(Error::InvalidResponse(
            "refresh response has an empty access_token".into(),
        ));
    }
    debug!("access token refreshed");
    Ok(token)
}

/// Ask the server to rotate the anti-forgery cookie.
///
/// Returns the token if the body carries one. The body is otherwise
/// ignored: the cookie set on the transport's jar is what matters.
pub async fn fetch_csrf_token(transport: &dyn Transport, path: &str) -> Result<Option<String>> {
    let response = transport
        .send(&ApiRequest::get(path))
        .await
        .map_err(|e| Error::Http(format!("anti-forgery token request failed: {e}")))?;

    if !response.is_success() {
        return Err(Error::Rejected {
            status: response.status.as_u16(),
            body: response.text(),
        });
    }

    let body: CsrfTokenResponse = response.json().unwrap_or_default();
    debug!(in_body = body.csrf_token.is_some(), "anti-forgery token refetched");
    Ok(body.csrf_token)
}

//! Pre-flight header stamping
//!
//! Reads the credential store and the anti-forgery source fresh for every
//! attempt, so a refresh finished by another request is picked up by the
//! next one without any caching here.

use std::sync::Arc;

use api_transport::{ApiRequest, HeaderMap, HeaderName, HeaderValue};
use session_auth::constants::{CSRF_HEADER, is_state_changing};
use session_auth::{AntiForgeryTokenSource, CredentialStore};
use tracing::{debug, warn};

/// Stamps `Authorization` and `X-CSRF-Token` onto outgoing requests.
pub struct RequestAttacher {
    credentials: Arc<CredentialStore>,
    anti_forgery: Arc<dyn AntiForgeryTokenSource>,
}

impl RequestAttacher {
    pub fn new(
        credentials: Arc<CredentialStore>,
        anti_forgery: Arc<dyn AntiForgeryTokenSource>,
    ) -> Self {
        Self {
            credentials,
            anti_forgery,
        }
    }

    /// Return `request` with auth headers set. Never fails.
    ///
    /// A write without an anti-forgery token is sent as-is: the server
    /// rejects it with a 403 the classifier knows how to recover from.
    pub async fn attach(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(token) = self.credentials.access_token().await {
            set_bearer(&mut request.headers, &token);
        }

        if is_state_changing(&request.method) {
            match self.anti_forgery.current() {
                Some(token) => set_anti_forgery(&mut request.headers, &token),
                None => warn!(
                    method = %request.method,
                    path = %request.path,
                    "no anti-forgery token available, sending without it"
                ),
            }
        }

        request
    }
}

/// Set `Authorization: Bearer <token>`, replacing any previous value.
///
/// Returns false (and leaves the headers alone) if the token is not a valid
/// header value.
pub fn set_bearer(headers: &mut HeaderMap, token: &str) -> bool {
    match HeaderValue::from_str(&format!("Bearer {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static("authorization"), value);
            true
        }
        Err(e) => {
            warn!(error = %e, "access token is not a valid header value, not attaching");
            false
        }
    }
}

/// The token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HeaderName::from_static("authorization"))?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn set_anti_forgery(headers: &mut HeaderMap, token: &str) {
    match HeaderValue::from_str(token) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(CSRF_HEADER), value);
            debug!("anti-forgery header attached");
        }
        Err(e) => warn!(error = %e, "anti-forgery token is not a valid header value, not attaching"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_auth::MemoryTokenSource;

    async fn attacher(token: Option<&str>, csrf: Option<&str>) -> RequestAttacher {
        let store = Arc::new(CredentialStore::in_memory());
        if let Some(token) = token {
            store.set_credentials(token.into(), None).await.unwrap();
        }
        let source = match csrf {
            Some(c) => MemoryTokenSource::with_token(c),
            None => MemoryTokenSource::new(),
        };
        RequestAttacher::new(store, Arc::new(source))
    }

    #[tokio::test]
    async fn get_gets_bearer_but_no_csrf() {
        let attacher = attacher(Some("at_1"), Some("c_1")).await;
        let request = attacher.attach(ApiRequest::get("/chat/channels")).await;
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer at_1");
        assert!(request.headers.get("x-csrf-token").is_none());
    }

    #[tokio::test]
    async fn writes_get_bearer_and_csrf() {
        let attacher = attacher(Some("at_1"), Some("c_1")).await;
        for request in [
            ApiRequest::post("/tasks"),
            ApiRequest::put("/tasks/1"),
            ApiRequest::patch("/tasks/1"),
            ApiRequest::delete("/tasks/1"),
        ] {
            let request = attacher.attach(request).await;
            assert_eq!(request.headers.get("authorization").unwrap(), "Bearer at_1");
            assert_eq!(request.headers.get("x-csrf-token").unwrap(), "c_1");
        }
    }

    #[tokio::test]
    async fn signed_out_sends_no_authorization() {
        let attacher = attacher(None, Some("c_1")).await;
        let request = attacher.attach(ApiRequest::post("/auth/login")).await;
        assert!(request.headers.get("authorization").is_none());
        assert_eq!(request.headers.get("x-csrf-token").unwrap(), "c_1");
    }

    #[tokio::test]
    async fn missing_csrf_token_passes_request_through() {
        let attacher = attacher(Some("at_1"), None).await;
        let request = attacher
            .attach(ApiRequest::post("/tasks").form(&[("title", "x")]))
            .await;
        assert!(request.headers.get("x-csrf-token").is_none());
        assert_eq!(request.headers.get("authorization").unwrap(), "Bearer at_1");
        assert!(request.body.is_some());
    }

    #[tokio::test]
    async fn reads_store_fresh_on_every_call() {
        let store = Arc::new(CredentialStore::in_memory());
        store.set_credentials("old".into(), None).await.unwrap();
        let attacher = RequestAttacher::new(store.clone(), Arc::new(MemoryTokenSource::new()));

        let first = attacher.attach(ApiRequest::get("/x")).await;
        store.set_credentials("new".into(), None).await.unwrap();
        let second = attacher.attach(ApiRequest::get("/x")).await;

        assert_eq!(first.headers.get("authorization").unwrap(), "Bearer old");
        assert_eq!(second.headers.get("authorization").unwrap(), "Bearer new");
    }

    #[test]
    fn set_bearer_rejects_control_characters() {
        let mut headers = HeaderMap::new();
        assert!(!set_bearer(&mut headers, "bad\ntoken"));
        assert!(headers.is_empty());
        assert!(set_bearer(&mut headers, "good"));
        assert!(headers.get("authorization").unwrap().is_sensitive());
    }

    #[test]
    fn bearer_token_reads_back_what_was_set() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        set_bearer(&mut headers, "at_7");
        assert_eq!(bearer_token(&headers), Some("at_7"));
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}

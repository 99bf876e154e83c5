//! Outgoing request descriptor

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::{Result, TransportError};

/// An outgoing API request, before or after the pipeline stamps headers.
///
/// `path` is relative to the transport base URL (`/chat/channels`) unless it
/// already carries a scheme.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `value` as the JSON body and set `content-type`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| TransportError::InvalidRequest(format!("unserializable body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// URL-encode `pairs` as an `application/x-www-form-urlencoded` body.
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = Some(Bytes::from(encoded));
        self
    }

    /// Set a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether `path` is an absolute URL rather than a base-relative path.
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with("http://") || self.path.starts_with("https://")
    }

    /// Path component without query string, for endpoint matching.
    pub fn route(&self) -> &str {
        let path = if self.is_absolute() {
            // Skip "scheme://host" and keep everything from the first '/' after it
            let after_scheme = self.path.find("://").map(|i| i + 3).unwrap_or(0);
            match self.path[after_scheme..].find('/') {
                Some(i) => &self.path[after_scheme + i..],
                None => "/",
            }
        } else {
            self.path.as_str()
        };
        path.split('?').next().unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_sets_content_type() {
        let request = ApiRequest::post("/board/posts")
            .json(&serde_json::json!({"title": "hello"}))
            .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value =
            serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["title"], "hello");
    }

    #[test]
    fn form_body_is_url_encoded() {
        let request =
            ApiRequest::post("/auth/login").form(&[("username", "ann"), ("password", "p&ss word")]);
        assert_eq!(
            request.body.as_deref().unwrap(),
            b"username=ann&password=p%26ss+word"
        );
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn route_strips_query_string() {
        let request = ApiRequest::get("/chat/messages?limit=50");
        assert_eq!(request.route(), "/chat/messages");
        assert!(!request.is_absolute());
    }

    #[test]
    fn route_of_absolute_url_is_its_path() {
        let request = ApiRequest::get("https://api.example.test/api/auth/refresh?x=1");
        assert!(request.is_absolute());
        assert_eq!(request.route(), "/api/auth/refresh");

        let bare = ApiRequest::get("https://api.example.test");
        assert_eq!(bare.route(), "/");
    }

    #[test]
    fn header_replaces_previous_value() {
        let request = ApiRequest::get("/x")
            .header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("a"),
            )
            .header(
                HeaderName::from_static("x-trace"),
                HeaderValue::from_static("b"),
            );
        assert_eq!(request.headers.get("x-trace").unwrap(), "b");
        assert_eq!(request.headers.len(), 1);
    }
}

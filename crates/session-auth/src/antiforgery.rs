//! Anti-forgery (CSRF) token sources
//!
//! The server rotates the anti-forgery token by setting a `csrf_token`
//! cookie (double-submit pattern). The pipeline only needs "what is the
//! token right now", so the lookup is a small trait with one implementation
//! per environment.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};

use crate::constants::CSRF_COOKIE;

/// Where the current anti-forgery token comes from.
pub trait AntiForgeryTokenSource: Send + Sync {
    /// The token to send right now, if any.
    fn current(&self) -> Option<String>;

    /// A token seen in a response body (login, refresh, token refetch).
    ///
    /// Cookie-backed sources ignore this: the server already updated the jar.
    fn observe(&self, _token: &str) {}
}

/// Reads the token from the transport's cookie jar.
pub struct CookieJarTokenSource {
    jar: Arc<Jar>,
    url: Url,
}

impl CookieJarTokenSource {
    /// `url` scopes the lookup (normally the API base URL).
    pub fn new(jar: Arc<Jar>, url: Url) -> Self {
        Self { jar, url }
    }

    pub fn for_transport(transport: &api_transport::ReqwestTransport) -> Self {
        Self::new(transport.jar(), transport.base().clone())
    }
}

impl AntiForgeryTokenSource for CookieJarTokenSource {
    fn current(&self) -> Option<String> {
        let header = self.jar.cookies(&self.url)?;
        let header = header.to_str().ok()?;
        cookie_value(header, CSRF_COOKIE).map(str::to_owned)
    }
}

/// Holds the last observed token in memory.
///
/// For transports without a cookie jar, and for tests.
#[derive(Default)]
pub struct MemoryTokenSource {
    token: RwLock<Option<String>>,
}

impl MemoryTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl AntiForgeryTokenSource for MemoryTokenSource {
    fn current(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn observe(&self, token: &str) {
        self.set(token);
    }
}

/// Find `name` in a `Cookie` header value (`a=1; b=2`).
///
/// Empty values count as absent. Surrounding double quotes are stripped.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

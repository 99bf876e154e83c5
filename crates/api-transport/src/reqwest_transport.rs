//! reqwest-backed transport with a shared cookie jar
//!
//! The server keeps two credentials out of reach of the pipeline: the
//! HttpOnly refresh cookie and the anti-forgery cookie. Both live in the
//! `Jar` attached to the client, so every request (including the direct
//! refresh call) carries them without the pipeline touching them. The jar is
//! exposed so the anti-forgery token source can read the current token.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::cookie::Jar;
use tracing::debug;

use crate::{ApiRequest, ApiResponse, Result, SendFuture, Transport, TransportError};

/// HTTP transport over `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    base: Url,
    jar: Arc<Jar>,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport rooted at `base_url` (e.g. `https://host/api`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("invalid base url {base_url}: {e}")))?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| TransportError::Request(format!("building http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            base,
            jar,
            timeout,
        })
    }

    /// Cookie jar shared with the underlying client.
    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    /// Parsed base URL, used to scope cookie lookups.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a request path.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

impl Transport for ReqwestTransport {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a> {
        Box::pin(async move {
            let url = self.url_for(&request.path);
            debug!(method = %request.method, url = %url, "sending request");

            let mut builder = self
                .client
                .request(request.method.clone(), &url)
                .headers(request.headers.clone())
                .timeout(self.timeout);
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder.send().await.map_err(classify_reqwest_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Request(format!("reading response body: {e}")))?;

            debug!(method = %request.method, url = %url, status = status.as_u16(), "received response");
            Ok(ApiResponse::new(status, headers, body))
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

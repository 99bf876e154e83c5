//! Scripted in-process API server for pipeline tests
//!
//! Behaves like the real backend where the pipeline cares: bearer checks,
//! anti-forgery checks on writes outside `/auth`, token rotation on refresh
//! and login, and a handful of fixed failure routes. Every request is logged
//! so tests can assert exactly what went over the wire.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use api_transport::{
    ApiRequest, ApiResponse, HeaderMap, HeaderValue, Method, SendFuture, StatusCode, Transport,
    TransportError,
};
use parking_lot::Mutex;
use serde_json::json;
use session_auth::MemoryTokenSource;
use session_auth::constants::is_state_changing;

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub(crate) struct Seen {
    pub method: Method,
    pub route: String,
    pub authorization: Option<String>,
    pub csrf: Option<String>,
}

pub(crate) struct MockApi {
    valid_token: Mutex<String>,
    valid_csrf: Mutex<String>,
    issued: AtomicUsize,
    reject_refresh: AtomicBool,
    rotate_csrf_on_refresh: AtomicBool,
    csrf_fetch_fails: AtomicBool,
    refresh_delay: Duration,
    /// Stands in for the browser cookie jar: the server "sets the cookie" here.
    pub csrf_source: Arc<MemoryTokenSource>,
    seen: Mutex<Vec<Seen>>,
    refresh_calls: AtomicUsize,
    csrf_calls: AtomicUsize,
}

impl MockApi {
    /// Server that accepts `at_1` and anti-forgery token `c_1`.
    pub fn new() -> Self {
        Self {
            valid_token: Mutex::new("at_1".into()),
            valid_csrf: Mutex::new("c_1".into()),
            issued: AtomicUsize::new(1),
            reject_refresh: AtomicBool::new(false),
            rotate_csrf_on_refresh: AtomicBool::new(true),
            csrf_fetch_fails: AtomicBool::new(false),
            refresh_delay: Duration::ZERO,
            csrf_source: Arc::new(MemoryTokenSource::with_token("c_1")),
            seen: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            csrf_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn rejecting_refresh(self) -> Self {
        self.reject_refresh.store(true, Ordering::SeqCst);
        self
    }

    /// Refresh issues a token but leaves the anti-forgery cookie alone.
    pub fn without_csrf_rotation(self) -> Self {
        self.rotate_csrf_on_refresh.store(false, Ordering::SeqCst);
        self
    }

    pub fn failing_csrf_fetch(self) -> Self {
        self.csrf_fetch_fails.store(true, Ordering::SeqCst);
        self
    }

    /// Invalidate the current access token (it "expires").
    pub fn expire_token(&self) {
        *self.valid_token.lock() = "expired".into();
    }

    /// Rotate the server-side anti-forgery token without telling the client.
    pub fn rotate_csrf(&self, token: &str) {
        *self.valid_csrf.lock() = token.into();
    }

    pub fn valid_token(&self) -> String {
        self.valid_token.lock().clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn csrf_calls(&self) -> usize {
        self.csrf_calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    /// Number of requests that hit `route`.
    pub fn hits(&self, route: &str) -> usize {
        self.seen.lock().iter().filter(|s| s.route == route).count()
    }

    fn next_serial(&self) -> usize {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record(&self, request: &ApiRequest) {
        let header = |name: &str| {
            request
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        self.seen.lock().push(Seen {
            method: request.method.clone(),
            route: request.route().to_owned(),
            authorization: header("authorization"),
            csrf: header("x-csrf-token"),
        });
    }

    async fn respond(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.record(request);
        let route = request.route().to_owned();
        let method = &request.method;

        match (method.clone(), route.as_str()) {
            (Method::POST, "/auth/refresh") => return Ok(self.refresh().await),
            (Method::GET, "/auth/csrf-token") => return Ok(self.csrf_token()),
            (Method::POST, "/auth/login") => return Ok(self.login(request)),
            (_, "/unreachable") => {
                return Err(TransportError::Connect("connection refused".into()));
            }
            _ => {}
        }

        let expected = format!("Bearer {}", self.valid_token.lock());
        let authorized = request
            .headers
            .get("authorization")
            .is_some_and(|v| v.as_bytes() == expected.as_bytes());
        if !authorized || route == "/always-401" {
            return Ok(detail(401, "Could not validate credentials"));
        }

        if is_state_changing(method) && !route.starts_with("/auth/") {
            match request.headers.get("x-csrf-token") {
                None => return Ok(detail(403, "CSRF token missing")),
                Some(v) if v.as_bytes() != self.valid_csrf.lock().as_bytes() => {
                    return Ok(detail(403, "CSRF token invalid"));
                }
                Some(_) => {}
            }
        }

        Ok(match (method.clone(), route.as_str()) {
            (Method::GET, "/auth/me") => ok(json!({
                "id": 7,
                "username": "alice",
                "email": "alice@example.test",
                "role": "admin",
                "full_name": "Alice Example",
            })),
            (Method::POST, "/auth/logout") => {
                *self.valid_token.lock() = "logged-out".into();
                ok(json!({"message": "Successfully logged out"}))
            }
            (Method::GET, r) if r.starts_with("/items/") => {
                ok(json!({"id": r.trim_start_matches("/items/")}))
            }
            (Method::POST, "/items") => {
                ApiResponse::new(StatusCode::CREATED, HeaderMap::new(), r#"{"id":"99"}"#)
            }
            (_, "/legacy") => detail(405, "Method Not Allowed"),
            (_, "/admin/blocked") => blocked(),
            (_, "/admin/forbidden") => detail(403, "Not enough permissions"),
            (Method::POST, "/csrf-stuck") => detail(403, "CSRF token invalid"),
            (_, "/broken") => detail(500, "Internal Server Error"),
            _ => detail(404, "Not Found"),
        })
    }

    async fn refresh(&self) -> ApiResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if self.reject_refresh.load(Ordering::SeqCst) {
            return detail(401, "Invalid refresh token");
        }
        let n = self.next_serial();
        let token = format!("at_{n}");
        *self.valid_token.lock() = token.clone();
        if !self.rotate_csrf_on_refresh.load(Ordering::SeqCst) {
            return ok(json!({"access_token": token, "token_type": "bearer"}));
        }
        let csrf = format!("c_{n}");
        *self.valid_csrf.lock() = csrf.clone();
        self.csrf_source.set(csrf.clone());
        ok(json!({"access_token": token, "token_type": "bearer", "csrf_token": csrf}))
    }

    fn csrf_token(&self) -> ApiResponse {
        self.csrf_calls.fetch_add(1, Ordering::SeqCst);
        if self.csrf_fetch_fails.load(Ordering::SeqCst) {
            return detail(500, "Internal Server Error");
        }
        let csrf = format!("c_fresh_{}", self.next_serial());
        *self.valid_csrf.lock() = csrf.clone();
        self.csrf_source.set(csrf.clone());
        ok(json!({"csrf_token": csrf}))
    }

    fn login(&self, request: &ApiRequest) -> ApiResponse {
        let body = request
            .body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        let field = |name: &str| {
            body.split('&')
                .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
                .unwrap_or_default()
                .to_owned()
        };
        match (field("username").as_str(), field("password").as_str()) {
            ("blocked", _) => blocked(),
            ("alice", "correct") => {
                let token = format!("at_login_{}", self.next_serial());
                *self.valid_token.lock() = token.clone();
                *self.valid_csrf.lock() = "c_login".into();
                self.csrf_source.set("c_login");
                ok(json!({"access_token": token, "token_type": "bearer", "csrf_token": "c_login"}))
            }
            _ => detail(401, "Incorrect username or password"),
        }
    }
}

impl Transport for MockApi {
    fn base_url(&self) -> &str {
        "http://mock.test/api"
    }

    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a> {
        Box::pin(self.respond(request))
    }
}

fn ok(body: serde_json::Value) -> ApiResponse {
    ApiResponse::new(StatusCode::OK, HeaderMap::new(), body.to_string())
}

fn detail(status: u16, detail: &str) -> ApiResponse {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ApiResponse::new(status, HeaderMap::new(), json!({ "detail": detail }).to_string())
}

fn blocked() -> ApiResponse {
    let mut response = detail(403, "Account is blocked");
    response
        .headers
        .insert("x-account-blocked", HeaderValue::from_static("true"));
    response
}

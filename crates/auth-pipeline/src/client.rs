//! Authenticated API client
//!
//! Owns the pipeline: attach, send, classify, recover, replay. Every
//! attempt, including replays, goes through `dispatch`, so a replay after a
//! refresh still gets anti-forgery recovery and vice versa. The retry
//! context carried into each attempt is what keeps this bounded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use api_transport::{ApiRequest, ApiResponse, Transport};
use common::Secret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_auth::{
    AntiForgeryTokenSource, CredentialStore, TokenResponse, UserIdentity, fetch_csrf_token,
};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::attach::{RequestAttacher, bearer_token, set_bearer};
use crate::classify::{Outcome, classify};
use crate::coordinator::RefreshCoordinator;
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};
use crate::metrics;
use crate::retry::{RetryCause, RetryContext};
use crate::session::{LoginNavigator, SessionEndReason, SessionGuard};

type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    anti_forgery: Arc<dyn AntiForgeryTokenSource>,
    attacher: RequestAttacher,
    coordinator: RefreshCoordinator,
    session: Arc<SessionGuard>,
    endpoints: Endpoints,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
        anti_forgery: Arc<dyn AntiForgeryTokenSource>,
        navigator: Arc<dyn LoginNavigator>,
        endpoints: Endpoints,
    ) -> Self {
        let session = Arc::new(SessionGuard::new(
            credentials.clone(),
            navigator,
            endpoints.login_route.clone(),
        ));
        let coordinator = RefreshCoordinator::new(
            transport.clone(),
            credentials.clone(),
            anti_forgery.clone(),
            session.clone(),
            endpoints.refresh.clone(),
        );
        Self {
            attacher: RequestAttacher::new(credentials.clone(), anti_forgery.clone()),
            transport,
            credentials,
            anti_forgery,
            coordinator,
            session,
            endpoints,
        }
    }

    /// Send a request through the pipeline.
    ///
    /// Resolves with the server's success response, possibly after one
    /// refresh and one anti-forgery refetch. Anything else is an `Error`
    /// naming the classification that fired.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
        );
        self.dispatch(request, RetryContext::initial(), None)
            .instrument(span)
            .await
    }

    /// One attempt. `bearer` overrides the stored token for replays after a
    /// refresh, so the replay uses the token that refresh produced even if
    /// the store has moved on.
    fn dispatch<'a>(
        &'a self,
        request: ApiRequest,
        retry: RetryContext,
        bearer: Option<String>,
    ) -> DispatchFuture<'a> {
        Box::pin(async move {
            let mut prepared = self.attacher.attach(request.clone()).await;
            if let Some(token) = &bearer {
                set_bearer(&mut prepared.headers, token);
            }

            let response = match self.transport.send(&prepared).await {
                Ok(response) => response,
                Err(e) => return fail(e.into()),
            };
            if response.is_success() {
                return Ok(response);
            }

            let outcome = classify(&response, &request, retry, &self.endpoints);
            debug!(status = response.status.as_u16(), outcome = ?outcome, "request failed");

            match outcome {
                Outcome::CredentialExpired { retry: true } => {
                    let sent = bearer_token(&prepared.headers);
                    let token = match self.coordinator.handle_expired_credential(sent).await {
                        Ok(token) => token,
                        Err(e) => return fail(e),
                    };
                    debug!("replaying after refresh");
                    self.dispatch(request, retry.after(RetryCause::CredentialExpired), Some(token))
                        .await
                }
                Outcome::CredentialExpired { retry: false } => {
                    warn!("credential rejected again after refresh");
                    fail(Error::CredentialExpired {
                        body: response.text(),
                    })
                }
                Outcome::AntiForgeryInvalid { retry: true, detail } => {
                    info!(detail = %detail, "anti-forgery token rejected, refetching");
                    if let Err(e) = self.recover_anti_forgery().await {
                        return fail(e);
                    }
                    self.dispatch(request, retry.after(RetryCause::AntiForgeryInvalid), bearer)
                        .await
                }
                Outcome::AntiForgeryInvalid {
                    retry: false,
                    detail,
                } => {
                    warn!(detail = %detail, "anti-forgery token rejected again after refetch");
                    fail(Error::AntiForgeryInvalid { detail })
                }
                Outcome::AccountBlocked { end_session } => {
                    warn!("account is blocked");
                    if end_session {
                        self.session.terminate(SessionEndReason::AccountBlocked).await;
                    }
                    fail(Error::AccountBlocked {
                        body: response.text(),
                        session_ended: end_session,
                    })
                }
                Outcome::RefreshRejected => {
                    self.session.terminate(SessionEndReason::RefreshFailed).await;
                    fail(Error::RefreshFailed(format!(
                        "refresh endpoint returned {}",
                        response.status
                    )))
                }
                Outcome::LoginRejected => fail(Error::InvalidCredentials),
                Outcome::MethodNotAllowed => {
                    let url = format!("{}{}", self.transport.base_url(), request.path);
                    warn!(
                        method = %request.method,
                        url = %url,
                        allow = response.header_str("allow").unwrap_or("-"),
                        body = %response.text(),
                        "method not allowed"
                    );
                    fail(Error::MethodNotAllowed {
                        method: request.method.clone(),
                        url,
                        body: response.text(),
                    })
                }
                Outcome::Forbidden | Outcome::Unclassified => fail(Error::Status {
                    status: response.status,
                    body: response.text(),
                }),
            }
        })
    }

    /// Ask the server for a fresh anti-forgery token.
    ///
    /// Goes straight to the transport: a 403 here must not trigger another
    /// refetch.
    async fn recover_anti_forgery(&self) -> Result<()> {
        match fetch_csrf_token(self.transport.as_ref(), &self.endpoints.csrf_token).await {
            Ok(token) => {
                if let Some(token) = token.as_deref() {
                    self.anti_forgery.observe(token);
                }
                metrics::record_csrf_refetch("success");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "anti-forgery token refetch failed");
                metrics::record_csrf_refetch("failure");
                Err(Error::AntiForgeryRefetch(e))
            }
        }
    }

    /// Sign in with a username and password.
    ///
    /// Stores the new access token, re-arms session termination, then loads
    /// the user profile.
    pub async fn login(&self, username: &str, password: &Secret<String>) -> Result<UserIdentity> {
        let request = ApiRequest::post(&self.endpoints.login)
            .form(&[("username", username), ("password", password.expose().as_str())]);
        let response = self.send(request).await?;
        let token: TokenResponse = response
            .json()
            .map_err(|e| Error::InvalidResponse(format!("login response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(Error::InvalidResponse(
                "login response has an empty access_token".into(),
            ));
        }

        self.credentials
            .set_credentials(token.access_token, None)
            .await?;
        if let Some(csrf) = token.csrf_token.as_deref() {
            self.anti_forgery.observe(csrf);
        }
        self.session.rearm();
        info!(username, "signed in");

        self.current_user().await
    }

    /// Sign out. Always clears local credentials, even if the server call
    /// fails.
    ///
    /// The server call skips recovery: a 401 here must not refresh or send
    /// the user to the login route.
    pub async fn logout(&self) -> Result<()> {
        if self.credentials.is_authenticated().await {
            let request = self
                .attacher
                .attach(ApiRequest::post(&self.endpoints.logout))
                .await;
            match self.transport.send(&request).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => warn!(
                    status = response.status.as_u16(),
                    "server logout failed, clearing local session anyway"
                ),
                Err(e) => warn!(error = %e, "server logout failed, clearing local session anyway"),
            }
        }
        self.credentials.clear().await?;
        info!("signed out");
        Ok(())
    }

    /// Fetch the signed-in user and remember it in the credential store.
    pub async fn current_user(&self) -> Result<UserIdentity> {
        let user: UserIdentity = self.get_json(&self.endpoints.current_user).await?;
        self.credentials.set_user(user.clone()).await?;
        Ok(user)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(ApiRequest::get(path)).await?;
        response
            .json()
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).json(body)?;
        let response = self.send(request).await?;
        response
            .json()
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Whether a fatal failure ended the session since the last login.
    pub fn session_ended(&self) -> bool {
        self.session.has_ended()
    }
}

fn fail<T>(err: Error) -> Result<T> {
    metrics::record_failure(err.classification());
    Err(err)
}

//! Single-flight credential refresh
//!
//! When several requests see a 401 at once, exactly one of them (the
//! leader) calls the refresh endpoint. The others register a oneshot
//! waiter and suspend until the leader settles the cycle. Waiters are
//! released in arrival order with the leader's result: the new token on
//! success, the same `RefreshFailed` on failure, `RefreshAbandoned` if the
//! leader is dropped first.
//!
//! State machine (behind a parking_lot mutex, never held across `.await`):
//!
//! ```text
//! Idle --first 401--> Refreshing { waiters } --settle--> Idle
//! ```
//!
//! The coordinator only produces the token. Replaying the original request
//! is the caller's job, so replays run through the full pipeline again.

use std::sync::Arc;

use api_transport::Transport;
use parking_lot::Mutex;
use session_auth::{AntiForgeryTokenSource, CredentialStore, refresh_access_token};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::session::{SessionEndReason, SessionGuard};

type Waiter = oneshot::Sender<Result<String>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

enum Role {
    Leader,
    Follower(oneshot::Receiver<Result<String>>),
}

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    anti_forgery: Arc<dyn AntiForgeryTokenSource>,
    session: Arc<SessionGuard>,
    refresh_path: String,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
        anti_forgery: Arc<dyn AntiForgeryTokenSource>,
        session: Arc<SessionGuard>,
        refresh_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            anti_forgery,
            session,
            refresh_path: refresh_path.into(),
            state: Mutex::new(RefreshState::Idle),
        }
    }

    /// Obtain a fresh access token, refreshing at most once for all
    /// concurrent callers.
    ///
    /// `rejected` is the bearer the failed request carried. If the store
    /// already holds a different token, a refresh finished after that
    /// request went out and the stored token is returned without refreshing.
    ///
    /// On success the credential store already holds the returned token.
    /// On failure the session has been terminated and every caller gets
    /// `Error::RefreshFailed`.
    pub async fn handle_expired_credential(&self, rejected: Option<&str>) -> Result<String> {
        if let Some(current) = self.credentials.access_token().await {
            if Some(current.as_str()) != rejected {
                debug!("token already rotated since the request was sent, reusing it");
                return Ok(current);
            }
        }

        let role = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    Role::Leader
                }
                RefreshState::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Role::Follower(rx)
                }
            }
        };

        match role {
            Role::Leader => self.lead().await,
            Role::Follower(rx) => {
                debug!("refresh in flight, waiting for it");
                rx.await.unwrap_or(Err(Error::RefreshAbandoned))
            }
        }
    }

    async fn lead(&self) -> Result<String> {
        let cycle = Cycle {
            state: &self.state,
            settled: false,
        };
        info!("access token expired, refreshing");

        match refresh_access_token(self.transport.as_ref(), &self.refresh_path).await {
            Ok(token) => {
                if let Err(e) = self.credentials.replace_token(token.access_token.clone()).await {
                    error!(error = %e, "failed to persist refreshed token");
                }
                if let Some(csrf) = token.csrf_token.as_deref() {
                    self.anti_forgery.observe(csrf);
                }
                let result = Ok(token.access_token);
                let released = cycle.settle(&result);
                info!(waiters = released, "access token refreshed");
                metrics::record_refresh("success", released + 1);
                result
            }
            Err(e) => {
                warn!(error = %e, "refresh failed, ending session");
                self.session.terminate(SessionEndReason::RefreshFailed).await;
                let result = Err(Error::RefreshFailed(e.to_string()));
                let released = cycle.settle(&result);
                metrics::record_refresh("failure", released + 1);
                result
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Idle)
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        match &*self.state.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }
}

/// One refresh cycle owned by the leader.
///
/// Settling returns the state to `Idle` and wakes every waiter. If the
/// leader is dropped before settling (cancelled or panicked), waiters are
/// rejected so nobody waits forever and the next 401 starts a new cycle.
struct Cycle<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl Cycle<'_> {
    fn settle(mut self, result: &Result<String>) -> usize {
        self.settled = true;
        let waiters = take_waiters(self.state);
        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose request was cancelled has dropped its receiver.
            let _ = waiter.send(result.clone());
        }
        count
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = take_waiters(self.state);
        warn!(waiters = waiters.len(), "refresh abandoned before completing");
        for waiter in waiters {
            let _ = waiter.send(Err(Error::RefreshAbandoned));
        }
    }
}

fn take_waiters(state: &Mutex<RefreshState>) -> Vec<Waiter> {
    match std::mem::replace(&mut *state.lock(), RefreshState::Idle) {
        RefreshState::Idle => Vec::new(),
        RefreshState::Refreshing { waiters } => waiters,
    }
}

//! Session termination and login navigation
//!
//! Ending a session has two effects: the credential store is cleared, and
//! the user is sent to the login route. Clearing is idempotent and happens
//! on every call. Navigation is not: when several in-flight requests all
//! discover the session is over, only the first triggers it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use session_auth::CredentialStore;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::metrics;

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The server flagged the account as blocked.
    AccountBlocked,
    /// The refresh credential was rejected or the refresh call failed.
    RefreshFailed,
}

impl SessionEndReason {
    pub fn label(&self) -> &'static str {
        match self {
            SessionEndReason::AccountBlocked => "account_blocked",
            SessionEndReason::RefreshFailed => "refresh_failed",
        }
    }
}

impl std::fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Instruction to show the login screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    pub route: String,
    pub reason: SessionEndReason,
}

/// Whatever presents the login screen to the user.
pub trait LoginNavigator: Send + Sync {
    fn navigate_to_login(&self, redirect: LoginRedirect);
}

/// Navigator for headless use: logs the redirect and does nothing else.
pub struct LoggingNavigator;

impl LoginNavigator for LoggingNavigator {
    fn navigate_to_login(&self, redirect: LoginRedirect) {
        warn!(route = %redirect.route, reason = %redirect.reason, "session ended, login required");
    }
}

/// Navigator that forwards redirects to a channel the application drains.
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<LoginRedirect>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LoginRedirect>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LoginNavigator for ChannelNavigator {
    fn navigate_to_login(&self, redirect: LoginRedirect) {
        if self.tx.send(redirect).is_err() {
            warn!("login redirect dropped, receiver is gone");
        }
    }
}

/// Ends the session at most once until re-armed by a successful login.
pub struct SessionGuard {
    credentials: Arc<CredentialStore>,
    navigator: Arc<dyn LoginNavigator>,
    login_route: String,
    ended: AtomicBool,
}

impl SessionGuard {
    pub fn new(
        credentials: Arc<CredentialStore>,
        navigator: Arc<dyn LoginNavigator>,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            navigator,
            login_route: login_route.into(),
            ended: AtomicBool::new(false),
        }
    }

    /// Clear credentials and, on the first call since the last login,
    /// navigate to the login route.
    pub async fn terminate(&self, reason: SessionEndReason) {
        if let Err(e) = self.credentials.clear().await {
            error!(error = %e, "failed to clear credentials on session end");
        }

        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(reason = %reason, route = %self.login_route, "ending session");
        metrics::record_session_terminated(reason.label());
        self.navigator.navigate_to_login(LoginRedirect {
            route: self.login_route.clone(),
            reason,
        });
    }

    /// Allow the next termination to navigate again (after a new login).
    pub fn rearm(&self) {
        self.ended.store(false, Ordering::Release);
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

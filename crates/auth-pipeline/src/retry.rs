//! Per-request retry budget
//!
//! Each failure cause may trigger at most one corrective replay per original
//! request. The two budgets are independent: a request may be replayed once
//! after a credential refresh and once after an anti-forgery refetch, but
//! never twice for the same cause. The context is an immutable value passed
//! alongside the request; replays receive a new context from `after`.

/// Failure causes that allow one corrective replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    CredentialExpired,
    AntiForgeryInvalid,
}

/// Which retry budgets an attempt has already spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryContext {
    refreshed: bool,
    anti_forgery_refetched: bool,
}

impl RetryContext {
    /// Context for a request's first attempt.
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn has_retried(&self, cause: RetryCause) -> bool {
        match cause {
            RetryCause::CredentialExpired => self.refreshed,
            RetryCause::AntiForgeryInvalid => self.anti_forgery_refetched,
        }
    }

    /// Context for the replay that follows a corrective action for `cause`.
    #[must_use]
    pub fn after(self, cause: RetryCause) -> Self {
        match cause {
            RetryCause::CredentialExpired => Self {
                refreshed: true,
                ..self
            },
            RetryCause::AntiForgeryInvalid => Self {
                anti_forgery_refetched: true,
                ..self
            },
        }
    }
}

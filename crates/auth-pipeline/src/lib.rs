//! Authenticated request pipeline
//!
//! Every outbound API call goes through `AuthenticatedClient`, which runs
//! the same three stages for each attempt:
//! 1. `attach` stamps the bearer token and, for writes, the anti-forgery header
//! 2. the transport sends the request
//! 3. on failure, `classify` decides what to do with the response
//!
//! Recoverable failures get exactly one corrective action per cause before
//! the request is replayed:
//! - 401 → `RefreshCoordinator` performs (or waits for) a single shared refresh
//! - 403 with an anti-forgery detail → token refetch
//!
//! Fatal failures (refresh rejected, account blocked) end the session through
//! `SessionGuard`: credentials are cleared and the login navigation fires once.

pub mod attach;
pub mod classify;
pub mod client;
pub mod coordinator;
pub mod endpoints;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod session;

#[cfg(test)]
mod testing;

pub use attach::RequestAttacher;
pub use classify::{Outcome, classify};
pub use client::AuthenticatedClient;
pub use coordinator::RefreshCoordinator;
pub use endpoints::Endpoints;
pub use error::{Error, Result};
pub use retry::{RetryCause, RetryContext};
pub use session::{
    ChannelNavigator, LoggingNavigator, LoginNavigator, LoginRedirect, SessionEndReason,
    SessionGuard,
};

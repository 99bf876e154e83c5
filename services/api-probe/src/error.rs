//! Probe-level error types

use thiserror::Error;

/// Exit code when the session ended (refresh rejected or account blocked).
pub const SESSION_ENDED_EXIT_CODE: u8 = 3;

/// Failures of a probe command.
///
/// Setup failures (config, transport, credential file) are reported through
/// `anyhow` in `main`; these are the failures of the command itself.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("invalid --data JSON: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Pipeline(#[from] auth_pipeline::Error),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Pipeline(e) if e.ends_session() => SESSION_ENDED_EXIT_CODE,
            _ => 1,
        }
    }
}

/// Result alias using probe Error
pub type Result<T> = std::result::Result<T, Error>;

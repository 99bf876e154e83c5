//! Shared types for the authenticated API client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

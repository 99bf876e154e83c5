//! Session credentials for the authenticated API client
//!
//! Holds everything the request pipeline reads but does not own: the
//! credential store (access token + user identity), the anti-forgery token
//! source, and the two calls that must bypass the pipeline's hooks (token
//! refresh and anti-forgery refetch). The crate depends only on the
//! transport seam, so it can be tested without the pipeline.
//!
//! Session flow:
//! 1. Login response carries `access_token`; stored via `CredentialStore::set_credentials()`
//! 2. Server sets the refresh cookie and `csrf_token` cookie on the transport's jar
//! 3. Pipeline stamps `Authorization` from the store and `X-CSRF-Token` from the source
//! 4. On expiry the coordinator calls `token::refresh_access_token()` directly
//! 5. On fatal failure the store is cleared via `CredentialStore::clear()`

pub mod antiforgery;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use antiforgery::{AntiForgeryTokenSource, CookieJarTokenSource, MemoryTokenSource};
pub use constants::*;
pub use credentials::{Credential, CredentialStore, UserIdentity};
pub use error::{Error, Result};
pub use token::{CsrfTokenResponse, TokenResponse, fetch_csrf_token, refresh_access_token};

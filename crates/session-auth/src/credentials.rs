//! Credential store for the current session
//!
//! Holds the access token and the signed-in user. The pipeline reads the
//! token fresh for every request, so a refresh completed by one request is
//! visible to the next request immediately. A tokio Mutex serializes writers
//! (login, refresh, session termination).
//!
//! The store can optionally persist to a JSON file so a command-line session
//! survives between runs. Writes use temp-file + rename with 0600
//! permissions. The refresh credential is never stored here: it lives in the
//! server's HttpOnly cookie.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// The signed-in user, as returned by the current-user endpoint.
///
/// Only the fields the client needs; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Point-in-time copy of the session credentials.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub access_token: Option<Secret<String>>,
    pub user: Option<UserIdentity>,
}

/// On-disk form of `Credential`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSession {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<UserIdentity>,
}

/// Single source of truth for the current access token and user.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<Credential>,
}

impl CredentialStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Credential::default()),
        }
    }

    /// Load a persisted session from `path`.
    ///
    /// A missing file is a cold start: the store begins signed out and an
    /// empty session file is written so later loads take the normal path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let persisted = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let persisted: PersistedSession = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;
            info!(
                path = %path.display(),
                signed_in = persisted.access_token.is_some(),
                "loaded session"
            );
            persisted
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            let empty = PersistedSession::default();
            write_atomic(&path, &empty).await?;
            empty
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(Credential {
                access_token: persisted.access_token.map(Secret::new),
                user: persisted.user,
            }),
        })
    }

    /// Current access token, if signed in.
    pub async fn access_token(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.access_token.as_ref().map(|t| t.expose().clone())
    }

    /// Current user, if known.
    pub async fn user(&self) -> Option<UserIdentity> {
        self.state.lock().await.user.clone()
    }

    pub async fn snapshot(&self) -> Credential {
        self.state.lock().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.access_token.is_some()
    }

    /// Replace the session credentials and persist them if file-backed.
    pub async fn set_credentials(
        &self,
        access_token: String,
        user: Option<UserIdentity>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = Some(Secret::new(access_token));
        state.user = user;
        debug!(
            user = state.user.as_ref().map(|u| u.username.as_str()),
            "credentials updated"
        );
        self.persist(&state).await
    }

    /// Swap in a refreshed access token, keeping the known user.
    pub async fn replace_token(&self, access_token: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = Some(Secret::new(access_token));
        debug!("access token replaced");
        self.persist(&state).await
    }

    /// Record the signed-in user (after login, from the current-user endpoint).
    pub async fn set_user(&self, user: UserIdentity) -> Result<()> {
        let mut state = self.state.lock().await;
        state.user = Some(user);
        self.persist(&state).await
    }

    /// Drop the token and user (logout or fatal session end).
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = None;
        state.user = None;
        debug!("credentials cleared");
        self.persist(&state).await
    }

    async fn persist(&self, state: &Credential) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let persisted = PersistedSession {
            access_token: state.access_token.as_ref().map(|t| t.expose().clone()),
            user: state.user.clone(),
        };
        write_atomic(path, &persisted).await
    }
}

/// Write the session file atomically with owner-only permissions.
async fn write_atomic(path: &Path, data: &PersistedSession) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

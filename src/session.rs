//! Session identity.
//!
//! A [`SessionProvider`] answers "who is signed in" and publishes every
//! transition (sign in, sign out, restore on startup) on a watch channel.
//! The task store subscribes once and reloads on each change.
//!
//! [`LocalSessionProvider`] is the demo provider: no password, the identity
//! id is derived from the email so the same address always maps to the same
//! owner, and the session survives restarts in a small JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{Error, Result};

/// The active identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub email: String,
}

impl Session {
    /// Display handle: the part of the email before `@`.
    pub fn handle(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

/// Source of the current identity.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The signed-in identity, if any.
    fn current(&self) -> Option<Session>;

    /// Receiver that observes every session transition.
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;

    async fn sign_in(&self, email: &str) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;
}

/// Email-only provider, optionally persisted to a file.
pub struct LocalSessionProvider {
    path: Option<PathBuf>,
    state: watch::Sender<Option<Session>>,
}

impl LocalSessionProvider {
    /// Provider that forgets its session when dropped.
    pub fn in_memory() -> Self {
        let (state, _) = watch::channel(None);
        Self { path: None, state }
    }

    /// Provider persisted at `path`, restoring any stored session.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let restored = load_session(&path).await?;
        if let Some(session) = &restored {
            tracing::debug!(email = %session.email, "restored session");
        }
        let (state, _) = watch::channel(restored);
        Ok(Self {
            path: Some(path),
            state,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Stable identity id for an email address.
pub fn identity_for(email: &str) -> String {
    let normalized = email.trim().to_lowercase();
    Uuid::new_v5(&Uuid::NAMESPACE_OID, normalized.as_bytes()).to_string()
}

fn validate_email(email: &str) -> Result<&str> {
    let trimmed = email.trim();
    let valid = trimmed
        .split_once('@')
        .map(|(user, domain)| !user.is_empty() && !domain.is_empty() && !domain.contains('@'))
        .unwrap_or(false);
    if !valid {
        return Err(Error::InvalidArgument(format!(
            "'{trimmed}' is not a valid email address"
        )));
    }
    Ok(trimmed)
}

async fn load_session(path: &Path) -> Result<Option<Session>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&raw)?))
}

#[async_trait]
impl SessionProvider for LocalSessionProvider {
    fn current(&self) -> Option<Session> {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    async fn sign_in(&self, email: &str) -> Result<Session> {
        let email = validate_email(email)?;
        let session = Session {
            id: identity_for(email),
            email: email.to_string(),
        };
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_json::to_vec_pretty(&session)?).await?;
        }
        tracing::debug!(email = %session.email, "signed in");
        self.state.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        tracing::debug!("signed out");
        self.state.send_replace(None);
        Ok(())
    }
}

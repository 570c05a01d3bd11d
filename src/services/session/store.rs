//! Session store interface used by the auth handlers.
use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-layer errors.
///
/// Note:
/// - Auth callers treat every variant as fail-closed (500), never as
///   "not logged in".
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session backend connection error: {0}")]
    BackendConnection(String),
    #[error("session backend command error: {0}")]
    BackendCommand(String),
    #[error("session value error: {0}")]
    InvalidValue(#[from] serde_json::Error),
}

/// A string key/value store partitioned by session id.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    // Returns the backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn get(&self, session_id: &str, key: &str) -> SessionResult<Option<String>>;

    // Store `value` and (re)arm the session's expiry to `ttl`.
    async fn put(&self, session_id: &str, key: &str, value: &str, ttl: Duration)
    -> SessionResult<()>;

    async fn remove(&self, session_id: &str, key: &str) -> SessionResult<()>;

    // Drop every key of the session.
    async fn destroy(&self, session_id: &str) -> SessionResult<()>;

    // True when the session holds at least one live key.
    async fn exists(&self, session_id: &str) -> SessionResult<bool>;

    // Move every key of `from` to `to`; `from` no longer exists afterwards.
    async fn rename(&self, from: &str, to: &str) -> SessionResult<()>;
}

/// One client's session, as seen by a single request.
///
/// Created by the session middleware and placed in request extensions. Clones
/// share the id, so a [`Session::regenerate`] done by a handler is visible to
/// the middleware that has to reissue the cookie.
#[derive(Clone)]
pub struct Session {
    id: Arc<Mutex<SessionId>>,
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

#[derive(Debug)]
struct SessionId {
    current: String,
    regenerated: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.store.backend_name())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: impl Into<String>, store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self {
            id: Arc::new(Mutex::new(SessionId {
                current: id.into(),
                regenerated: false,
            })),
            store,
            ttl,
        }
    }

    // The id only ever holds a String; a poisoned lock is still consistent.
    fn lock_id(&self) -> std::sync::MutexGuard<'_, SessionId> {
        self.id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.lock_id().current.clone()
    }

    /// True once [`Session::regenerate`] has run during this request.
    pub fn is_regenerated(&self) -> bool {
        self.lock_id().regenerated
    }

    /// Move the session's data to a fresh id and retire the old one.
    ///
    /// Called whenever the session gains a principal, so an id known before
    /// login never identifies the logged-in user.
    pub async fn regenerate(&self) -> SessionResult<String> {
        let old = self.id();
        let new = Uuid::new_v4().to_string();
        self.store.rename(&old, &new).await?;

        let mut id = self.lock_id();
        id.current = new.clone();
        id.regenerated = true;
        Ok(new)
    }

    pub async fn get(&self, key: &str) -> SessionResult<Option<String>> {
        self.store.get(&self.id(), key).await
    }

    pub async fn put(&self, key: &str, value: &str) -> SessionResult<()> {
        self.store.put(&self.id(), key, value, self.ttl).await
    }

    pub async fn remove(&self, key: &str) -> SessionResult<()> {
        self.store.remove(&self.id(), key).await
    }

    pub async fn destroy(&self) -> SessionResult<()> {
        self.store.destroy(&self.id()).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> SessionResult<()> {
        let raw = serde_json::to_string(value)?;
        self.put(key, &raw).await
    }
}

use std::time::Duration;

use async_trait::async_trait;

use crate::services::session::store::{SessionError, SessionResult, SessionStore};

/// Valkey/Redis-backed session store.
///
/// Each session is one hash (`<prefix>:<session id>`) whose expiry is re-armed
/// on every write.
#[derive(Clone)]
pub struct ValkeySessionStore {
    manager: redis::aio::ConnectionManager,
    prefix: String,
}

impl std::fmt::Debug for ValkeySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeySessionStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl ValkeySessionStore {
    // Create a store from a URL like `redis://localhost:6379`
    pub async fn new(url: &str) -> SessionResult<Self> {
        Self::new_with_prefix(url, "session").await
    }

    pub async fn new_with_prefix(url: &str, prefix: impl Into<String>) -> SessionResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| SessionError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| SessionError::BackendConnection(e.to_string()))?;

        Ok(Self {
            manager,
            prefix: prefix.into(),
        })
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}:{}", self.prefix, session_id)
    }
}

#[async_trait]
impl SessionStore for ValkeySessionStore {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    async fn get(&self, session_id: &str, key: &str) -> SessionResult<Option<String>> {
        let mut conn = self.manager.clone();

        let resp: Option<String> = redis::cmd("HGET")
            .arg(self.key(session_id))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::BackendCommand(e.to_string()))?;

        Ok(resp)
    }

    async fn put(
        &self,
        session_id: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> SessionResult<()> {
        let mut conn = self.manager.clone();
        let full_key = self.key(session_id);

        // EXPIRE takes whole seconds; clamp to at least 1.
        let ttl_seconds: u64 = ttl.as_secs().max(1);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(&full_key)
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("EXPIRE")
            .arg(&full_key)
            .arg(ttl_seconds)
            .ignore();

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| SessionError::BackendCommand(e.to_string()))
    }

    async fn remove(&self, session_id: &str, key: &str) -> SessionResult<()> {
        let mut conn = self.manager.clone();

        let _: u64 = redis::cmd("HDEL")
            .arg(self.key(session_id))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::BackendCommand(e.to_string()))?;

        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> SessionResult<()> {
        let mut conn = self.manager.clone();

        let _: u64 = redis::cmd("DEL")
            .arg(self.key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::BackendCommand(e.to_string()))?;

        Ok(())
    }

    async fn exists(&self, session_id: &str) -> SessionResult<bool> {
        let mut conn = self.manager.clone();

        let found: u64 = redis::cmd("EXISTS")
            .arg(self.key(session_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::BackendCommand(e.to_string()))?;

        Ok(found > 0)
    }

    async fn rename(&self, from: &str, to: &str) -> SessionResult<()> {
        let mut conn = self.manager.clone();
        let from_key = self.key(from);

        // RENAME fails on a missing key; an empty session has nothing to move.
        if !self.exists(from).await? {
            return Ok(());
        }

        // RENAME keeps the remaining TTL of the hash.
        let _: () = redis::cmd("RENAME")
            .arg(&from_key)
            .arg(self.key(to))
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::BackendCommand(e.to_string()))?;

        Ok(())
    }
}

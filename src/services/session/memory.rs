use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::services::session::store::{SessionResult, SessionStore};

#[derive(Debug)]
struct Entry {
    values: HashMap<String, String>,
    expires_at: Instant,
}

// Every this many writes, expired sessions are swept out.
const SWEEP_EVERY: u64 = 256;

/// Process-local session store.
///
/// An expired session is dropped when it is touched, and a sweep over all
/// sessions runs every `SWEEP_EVERY` writes. Fine for a single instance,
/// use the Valkey store when running more than one.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Entry>,
    writes: AtomicU64,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, session_id: &str, key: &str) -> SessionResult<Option<String>> {
        let now = Instant::now();
        self.sessions
            .remove_if(session_id, |_, entry| entry.expires_at <= now);

        Ok(self
            .sessions
            .get(session_id)
            .and_then(|entry| entry.values.get(key).cloned()))
    }

    async fn put(
        &self,
        session_id: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> SessionResult<()> {
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired sessions swept");
            }
        }

        let now = Instant::now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Entry {
                values: HashMap::new(),
                expires_at: now + ttl,
            });

        if entry.expires_at <= now {
            entry.values.clear();
        }
        entry.values.insert(key.to_string(), value.to_string());
        entry.expires_at = now + ttl;

        Ok(())
    }

    async fn remove(&self, session_id: &str, key: &str) -> SessionResult<()> {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.values.remove(key);
        }
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> SessionResult<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn exists(&self, session_id: &str) -> SessionResult<bool> {
        let now = Instant::now();
        self.sessions
            .remove_if(session_id, |_, entry| entry.expires_at <= now);
        Ok(self.sessions.contains_key(session_id))
    }

    async fn rename(&self, from: &str, to: &str) -> SessionResult<()> {
        let Some((_, entry)) = self.sessions.remove(from) else {
            return Ok(());
        };
        if entry.expires_at > Instant::now() {
            self.sessions.insert(to.to_string(), entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let store = MemorySessionStore::new();
        let ttl = Duration::from_secs(60);

        store.put("s1", "k", "v", ttl).await.unwrap();
        store.put("s2", "k", "other", ttl).await.unwrap();

        assert_eq!(store.get("s1", "k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("s2", "k").await.unwrap().as_deref(), Some("other"));

        store.remove("s1", "k").await.unwrap();
        assert_eq!(store.get("s1", "k").await.unwrap(), None);

        store.destroy("s2").await.unwrap();
        assert_eq!(store.get("s2", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_sessions_are_dropped() {
        let store = MemorySessionStore::new();
        store
            .put("s1", "k", "v", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("s1", "k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn untouched_expired_sessions_are_swept_by_later_writes() {
        let store = MemorySessionStore::new();
        for i in 0..300 {
            store
                .put(&format!("stale-{i}"), "k", "v", Duration::from_millis(200))
                .await
                .unwrap();
        }
        assert_eq!(store.len(), 300);

        tokio::time::sleep(Duration::from_millis(300)).await;

        let fresh = SWEEP_EVERY as usize;
        for i in 0..fresh {
            store
                .put(&format!("fresh-{i}"), "k", "v", Duration::from_secs(60))
                .await
                .unwrap();
        }

        // The sweep at write 512 removed every stale session.
        assert_eq!(store.len(), fresh);
    }

    #[tokio::test]
    async fn purge_expired_reports_removed_sessions() {
        let store = MemorySessionStore::new();
        store.put("a", "k", "v", Duration::from_millis(10)).await.unwrap();
        store.put("b", "k", "v", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn exists_and_rename() {
        let store = MemorySessionStore::new();
        let ttl = Duration::from_secs(60);
        assert!(!store.exists("s1").await.unwrap());

        store.put("s1", "k", "v", ttl).await.unwrap();
        assert!(store.exists("s1").await.unwrap());

        store.rename("s1", "s2").await.unwrap();
        assert!(!store.exists("s1").await.unwrap());
        assert_eq!(store.get("s2", "k").await.unwrap().as_deref(), Some("v"));

        // Renaming a missing session is a no-op.
        store.rename("missing", "s3").await.unwrap();
        assert!(!store.exists("s3").await.unwrap());
    }
}

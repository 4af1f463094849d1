//! Session → thread affinity store.
//!
//! Maps caller-supplied session keys to conversation threads for a fixed TTL
//! counted from insertion. Reads never extend an entry. Entries are soft
//! hints only and are lost on restart.

use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<String, String>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Cache::builder().time_to_live(ttl).build(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Thread bound to `session_key`, if the binding has not expired.
    pub async fn get(&self, session_key: &str) -> Option<String> {
        self.sessions.get(session_key).await
    }

    /// Bind `session_key` to `thread_id` for one TTL, replacing any binding.
    pub async fn put(&self, session_key: impl Into<String>, thread_id: impl Into<String>) {
        self.sessions
            .insert(session_key.into(), thread_id.into())
            .await;
    }

    /// Bind `session_key` to `thread_id` unless it already has a live binding.
    ///
    /// Returns the thread that ends up bound, so concurrent first contacts for
    /// the same key agree on one thread.
    pub async fn get_or_insert(
        &self,
        session_key: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> String {
        let entry = self
            .sessions
            .entry(session_key.into())
            .or_insert(thread_id.into())
            .await;
        if !entry.is_fresh() {
            debug!(session = %entry.key(), thread_id = %entry.value(), "Session already bound");
        }
        entry.into_value()
    }

    /// Drop expired entries now instead of waiting for cache maintenance.
    pub async fn purge_expired(&self) {
        self.sessions.run_pending_tasks().await;
    }

    /// Number of live sessions.
    pub async fn len(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const SHORT_TTL: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_get_missing() {
        let store = SessionStore::new();
        assert_eq!(store.get("abc").await, None);
    }

    #[tokio::test]
    async fn test_ttl_not_refreshed_on_read() {
        let store = SessionStore::with_ttl(SHORT_TTL);
        store.put("abc", "T1").await;

        sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("abc").await.as_deref(), Some("T1"));

        sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("abc").await, None);
    }

    #[tokio::test]
    async fn test_put_replaces_and_restarts_ttl() {
        let store = SessionStore::with_ttl(SHORT_TTL);
        store.put("abc", "T1").await;
        sleep(Duration::from_millis(120)).await;
        store.put("abc", "T2").await;
        sleep(Duration::from_millis(120)).await;
        assert_eq!(store.get("abc").await.as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_get_or_insert_keeps_live_binding() {
        let store = SessionStore::with_ttl(SHORT_TTL);
        assert_eq!(store.get_or_insert("abc", "T1").await, "T1");
        assert_eq!(store.get_or_insert("abc", "T2").await, "T1");

        sleep(SHORT_TTL + Duration::from_millis(50)).await;
        assert_eq!(store.get_or_insert("abc", "T3").await, "T3");
        assert_eq!(store.get("abc").await.as_deref(), Some("T3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_contact_converges() {
        let store = SessionStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.get_or_insert("abc", format!("T{i}")).await
            }));
        }

        let mut bound = Vec::new();
        for h in handles {
            bound.push(h.await.unwrap());
        }
        bound.dedup();
        assert_eq!(bound.len(), 1);
        assert_eq!(store.get("abc").await, Some(bound[0].clone()));
    }

    #[tokio::test]
    async fn test_len_counts_live_sessions() {
        let store = SessionStore::with_ttl(SHORT_TTL);
        store.put("a", "T1").await;
        sleep(Duration::from_millis(120)).await;
        store.put("b", "T2").await;
        assert_eq!(store.len().await, 2);

        sleep(Duration::from_millis(120)).await;
        store.purge_expired().await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("b").await.as_deref(), Some("T2"));
    }
}

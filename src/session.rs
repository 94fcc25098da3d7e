//! Session state: the server-side record binding an analyze turn's SQL to a
//! later execute call from the same user.
//!
//! Sessions are in-memory by contract and single-consumer: `take` is an
//! atomic read-and-delete under the write lock, so two racing executes on
//! the same id can never both observe the session. A background sweeper
//! evicts entries past their soft expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::agents::IntentLabel;

/// How often the sweeper scans for expired sessions
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A pending turn awaiting SQL approval
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub utterance: String,
    pub intent: IntentLabel,
    pub plan: Vec<String>,
    pub sql: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(utterance: String, intent: IntentLabel, plan: Vec<String>, sql: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            utterance,
            intent,
            plan,
            sql,
            created_at: Utc::now(),
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        age.num_milliseconds() >= ttl.as_millis() as i64
    }
}

/// Thread-safe in-memory session store with soft expiry
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn put(&self, session: Session) {
        self.inner.write().await.insert(session.id, session);
    }

    /// Atomic read-and-delete. Expired entries are removed and reported as
    /// absent, so an expired id behaves exactly like an unknown one.
    pub async fn take(&self, id: Uuid) -> Option<Session> {
        let mut inner = self.inner.write().await;
        let session = inner.remove(&id)?;
        if session.expired(self.ttl) {
            debug!(session_id = %id, "session expired at take");
            return None;
        }
        Some(session)
    }

    /// Non-consuming read for the history endpoint.
    pub async fn peek(&self, id: Uuid) -> Option<Session> {
        let inner = self.inner.read().await;
        let session = inner.get(&id)?;
        if session.expired(self.ttl) {
            return None;
        }
        Some(session.clone())
    }

    /// Remove without expiry semantics; used when a retry replaces a turn.
    pub async fn remove(&self, id: Uuid) -> Option<Session> {
        self.inner.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Evict every expired entry; returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, session| !session.expired(self.ttl));
        before - inner.len()
    }

    /// Spawn the background expiry sweeper.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let evicted = store.evict_expired().await;
                if evicted > 0 {
                    debug!(evicted, "evicted expired sessions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            "How many sales?".to_string(),
            IntentLabel::Specific,
            vec!["Count sales".to_string()],
            "SELECT COUNT(*) FROM sales".to_string(),
        )
    }

    #[tokio::test]
    async fn test_put_take_consumes() {
        let store = SessionStore::new(Duration::from_secs(900));
        let s = session();
        let id = s.id;
        store.put(s).await;
        assert_eq!(store.len().await, 1);

        let taken = store.take(id).await;
        assert!(taken.is_some());
        // Second take observes nothing
        assert!(store.take(id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let store = SessionStore::new(Duration::ZERO);
        let s = session();
        let id = s.id;
        store.put(s).await;
        assert!(store.take(id).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_takes_yield_one_winner() {
        let store = SessionStore::new(Duration::from_secs(900));
        let s = session();
        let id = s.id;
        store.put(s).await;

        let (a, b) = tokio::join!(store.take(id), store.take(id));
        assert!(a.is_some() != b.is_some(), "exactly one take must win");
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let store = SessionStore::new(Duration::ZERO);
        store.put(session()).await;
        store.put(session()).await;
        assert_eq!(store.evict_expired().await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let store = SessionStore::new(Duration::from_secs(900));
        let s = session();
        let id = s.id;
        store.put(s).await;
        assert!(store.peek(id).await.is_some());
        assert_eq!(store.len().await, 1);
    }
}

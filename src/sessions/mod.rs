//! Consultation session store
//!
//! In-memory per-conversation history with TTL eviction. Each store owns
//! its sweep task; `destroy()` stops the sweep and drops all state so
//! multiple instances can coexist in tests.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::types::{ColloquyError, Result};

/// Default idle TTL before a session is evicted
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
/// Default sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One question/answer turn
#[derive(Debug, Clone)]
pub struct Exchange {
    pub question: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct ConsultationSession {
    history: Vec<Exchange>,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    last_activity: Instant,
}

/// Session store with concurrent access and TTL eviction
pub struct SessionStore {
    sessions: DashMap<Uuid, ConsultationSession>,
    ttl: Duration,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            ttl,
            sweep_interval,
            sweeper: Mutex::new(None),
        })
    }

    pub fn with_defaults() -> Arc<Self> {
        Self::new(DEFAULT_TTL, DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a fresh session and return its id.
    pub fn create_session(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            ConsultationSession {
                history: Vec::new(),
                created_at: Utc::now(),
                last_activity: Instant::now(),
            },
        );
        id
    }

    /// Append one exchange and bump activity.
    pub fn add_exchange(&self, id: Uuid, question: &str, response: &str) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| ColloquyError::NotFound(format!("Unknown session: {id}")))?;
        session.history.push(Exchange {
            question: question.to_string(),
            response: response.to_string(),
            timestamp: Utc::now(),
        });
        session.last_activity = Instant::now();
        Ok(())
    }

    /// Ordered history for a session.
    pub fn history(&self, id: Uuid) -> Result<Vec<Exchange>> {
        let session = self
            .sessions
            .get(&id)
            .ok_or_else(|| ColloquyError::NotFound(format!("Unknown session: {id}")))?;
        Ok(session.history.clone())
    }

    /// Remove a session immediately.
    pub fn expire_session(&self, id: Uuid) -> Result<()> {
        self.sessions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ColloquyError::NotFound(format!("Unknown session: {id}")))
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// One bounded eviction pass.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions
            .retain(|_, session| session.last_activity.elapsed() <= ttl);
        before - self.sessions.len()
    }

    /// Start the background sweep. Idempotent.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let store = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    debug!("Session sweep removed {} idle session(s)", removed);
                }
            }
        }));
    }

    /// Stop the sweep and drop all sessions. For graceful shutdown.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_add_history_roundtrip() {
        let store = SessionStore::with_defaults();
        let id = store.create_session();

        store.add_exchange(id, "q1", "r1").unwrap();
        store.add_exchange(id, "q2", "r2").unwrap();

        let history = store.history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "q1");
        assert_eq!(history[1].response, "r2");
        assert_eq!(store.active_count(), 1);
        store.destroy();
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = SessionStore::with_defaults();
        let missing = Uuid::new_v4();

        assert!(matches!(
            store.add_exchange(missing, "q", "r"),
            Err(ColloquyError::NotFound(_))
        ));
        assert!(matches!(store.history(missing), Err(ColloquyError::NotFound(_))));
        assert!(matches!(
            store.expire_session(missing),
            Err(ColloquyError::NotFound(_))
        ));
        store.destroy();
    }

    #[tokio::test]
    async fn expire_removes_immediately() {
        let store = SessionStore::with_defaults();
        let id = store.create_session();
        store.expire_session(id).unwrap();
        assert_eq!(store.active_count(), 0);
        assert!(store.history(id).is_err());
        store.destroy();
    }

    #[tokio::test]
    async fn sweep_evicts_idle_sessions() {
        let store = SessionStore::new(Duration::from_millis(20), Duration::from_millis(5));
        let id = store.create_session();
        store.start_sweeper();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.active_count(), 0);
        assert!(matches!(store.history(id), Err(ColloquyError::NotFound(_))));
        store.destroy();
    }

    #[tokio::test]
    async fn activity_resets_ttl() {
        let store = SessionStore::new(Duration::from_millis(50), Duration::from_millis(500));
        let id = store.create_session();

        tokio::time::sleep(Duration::from_millis(30)).await;
        store.add_exchange(id, "q", "r").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Idle time since last activity is under the TTL
        assert_eq!(store.sweep(), 0);
        assert_eq!(store.active_count(), 1);
        store.destroy();
    }
}

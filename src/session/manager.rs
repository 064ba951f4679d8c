//! Session manager for tracking live sessions
//!
//! Uses DashMap for concurrent lookups. Each id owns a slot guarded by its own
//! async mutex, so creating or resetting one id never blocks another and two
//! callers can never spawn duplicate processes for the same new id.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::types::{EngineConfig, EngineError, Result};

use super::prompt::{PromptClassifier, RegexPromptClassifier};
use super::session::{Session, SessionId, SessionKind};

type Slot = Arc<Mutex<Option<Arc<Session>>>>;

/// Manager for live sessions
///
/// Constructed once per process and torn down once with [`teardown`].
///
/// [`teardown`]: SessionManager::teardown
#[derive(Debug)]
pub struct SessionManager {
    config: Arc<EngineConfig>,
    classifier: Arc<dyn PromptClassifier>,
    /// Session slots keyed by id; an empty slot means "not spawned yet"
    slots: DashMap<SessionId, Slot>,
}

impl SessionManager {
    /// Create a manager using the default prompt classifier
    pub fn new(config: EngineConfig) -> Self {
        Self::with_classifier(config, Arc::new(RegexPromptClassifier))
    }

    /// Create a manager with a custom prompt classifier
    pub fn with_classifier(config: EngineConfig, classifier: Arc<dyn PromptClassifier>) -> Self {
        Self {
            config: Arc::new(config),
            classifier,
            slots: DashMap::new(),
        }
    }

    /// Engine configuration shared by every session
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the session for `id`, spawning it on first use
    ///
    /// Fails with `SessionKindMismatch` if the id is bound to the other kind.
    #[tracing::instrument(skip_all, fields(session = %id, kind = %kind))]
    pub async fn get_or_create(&self, id: SessionId, kind: SessionKind) -> Result<Arc<Session>> {
        // Clone the slot out so the map shard is not locked across the await
        let slot = Arc::clone(&self.slots.entry(id).or_default());
        let mut guard = slot.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.kind() != kind {
                return Err(EngineError::SessionKindMismatch {
                    session: id,
                    existing: session.kind(),
                    requested: kind,
                });
            }
            return Ok(Arc::clone(session));
        }

        tracing::info!("Spawning session");
        let session = Arc::new(
            Session::spawn(id, kind, Arc::clone(&self.config), Arc::clone(&self.classifier))
                .await?,
        );
        *guard = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Get an existing session, failing with `InvalidSession` if there is none
    pub async fn get(&self, id: SessionId) -> Result<Arc<Session>> {
        let slot = self.slots.get(&id).map(|r| Arc::clone(r.value()));
        let session = match slot {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        };
        session.ok_or_else(|| EngineError::invalid_session(format!("Session {id} does not exist")))
    }

    /// Terminate the session for `id`; the next use spawns a fresh one
    ///
    /// `reason` is only logged. Returns whether a session was running.
    #[tracing::instrument(skip_all, fields(session = %id))]
    pub async fn reset(&self, id: SessionId, reason: Option<&str>) -> bool {
        let slot = self.slots.get(&id).map(|r| Arc::clone(r.value()));
        let previous = match slot {
            Some(slot) => slot.lock().await.take(),
            None => None,
        };

        let Some(session) = previous else {
            tracing::info!(reason = reason.unwrap_or("none"), "Reset requested for idle session id");
            return false;
        };

        session.terminate().await;
        tracing::info!(
            kind = %session.kind(),
            reason = reason.unwrap_or("none"),
            "Session reset"
        );
        true
    }

    /// Terminate every live session
    pub async fn teardown(&self) {
        let slots: Vec<Slot> = self.slots.iter().map(|r| Arc::clone(r.value())).collect();
        self.slots.clear();

        let sessions: Vec<Arc<Session>> = join_all(slots.iter().map(|slot| async move {
            slot.lock().await.take()
        }))
        .await
        .into_iter()
        .flatten()
        .collect();

        let count = sessions.len();
        join_all(sessions.iter().map(|session| session.terminate())).await;
        tracing::info!(count, "All sessions terminated");
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.session_ids().await.len()
    }

    /// Ids of live sessions, ascending
    pub async fn session_ids(&self) -> Vec<SessionId> {
        let slots: Vec<(SessionId, Slot)> = self
            .slots
            .iter()
            .map(|r| (*r.key(), Arc::clone(r.value())))
            .collect();

        let mut ids = Vec::new();
        for (id, slot) in slots {
            if slot.lock().await.is_some() {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::Timeouts;

    fn test_config() -> EngineConfig {
        EngineConfig {
            executable: "/bin/bash".to_string(),
            ..EngineConfig::default()
        }
        .with_timeouts(Timeouts {
            first_output: Duration::from_secs(1),
            between_output: Duration::from_millis(500),
            dialog: Duration::from_millis(200),
            max_exec: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let manager = SessionManager::new(test_config());
        assert_eq!(manager.session_count().await, 0);

        let a = manager
            .get_or_create(SessionId::new(0), SessionKind::Shell)
            .await
            .unwrap();
        let b = manager
            .get_or_create(SessionId::new(0), SessionKind::Shell)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.session_ids().await, vec![SessionId::new(0)]);

        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let manager = SessionManager::new(test_config());
        manager
            .get_or_create(SessionId::new(1), SessionKind::Shell)
            .await
            .unwrap();

        let err = manager
            .get_or_create(SessionId::new(1), SessionKind::Interpreter)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::SessionKindMismatch {
                existing: SessionKind::Shell,
                requested: SessionKind::Interpreter,
                ..
            }
        ));

        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_concurrent_creation_spawns_once() {
        let manager = SessionManager::new(test_config());
        let id = SessionId::new(5);

        let (a, b) = tokio::join!(
            manager.get_or_create(id, SessionKind::Shell),
            manager.get_or_create(id, SessionKind::Shell)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.pid(), b.pid());
        assert_eq!(manager.session_count().await, 1);

        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let manager = SessionManager::new(test_config());
        let err = manager.get(SessionId::new(9)).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidSession(_)));
    }

    #[tokio::test]
    async fn test_reset_recreates_lazily() {
        let manager = SessionManager::new(test_config());
        let id = SessionId::new(2);
        let old = manager.get_or_create(id, SessionKind::Shell).await.unwrap();
        old.submit("export MARK=old").await.unwrap();

        assert!(manager.reset(id, Some("testing")).await);
        assert!(manager.get(id).await.is_err());
        assert!(!manager.reset(id, None).await);

        let err = old.submit("echo stale").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionReset(_)));

        let fresh = manager.get_or_create(id, SessionKind::Shell).await.unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        let outcome = fresh.submit("echo \"mark=$MARK\"").await.unwrap();
        assert_eq!(outcome.transcript, "mark=\n");
        assert_eq!(fresh.poll().await, "mark=\n");

        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let manager = SessionManager::new(test_config());
        let zero = manager
            .get_or_create(SessionId::new(0), SessionKind::Shell)
            .await
            .unwrap();
        let one = manager
            .get_or_create(SessionId::new(1), SessionKind::Shell)
            .await
            .unwrap();

        let (slow, fast) = tokio::join!(
            zero.submit("sleep 2; echo zero"),
            one.submit("echo one")
        );
        let (slow, fast) = (slow.unwrap(), fast.unwrap());

        assert_eq!(slow.transcript, "zero\n");
        assert_eq!(fast.transcript, "one\n");
        assert!(fast.elapsed < Duration::from_millis(1500));
        assert_eq!(one.poll().await, "one\n");

        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_teardown_terminates_everything() {
        let manager = SessionManager::new(test_config());
        let session = manager
            .get_or_create(SessionId::new(0), SessionKind::Shell)
            .await
            .unwrap();
        manager
            .get_or_create(SessionId::new(3), SessionKind::Shell)
            .await
            .unwrap();
        assert_eq!(manager.session_count().await, 2);

        manager.teardown().await;
        assert_eq!(manager.session_count().await, 0);
        assert!(matches!(
            session.submit("echo hi").await,
            Err(EngineError::SessionReset(_))
        ));
    }
}

//! Session management
//!
//! A session owns one pipeline instance, the live connection, and the
//! conversational state handed to the agent stage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;
use uuid::Uuid;

use voicebridge_pipeline::TurnLedger;

use crate::ServerError;

/// Session lifecycle state. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Transport connected, pipeline not yet running.
    Connecting,
    /// Accepting inbound audio.
    Active,
    /// No new inbound audio; in-flight turns complete and flush.
    Draining,
    /// All external-service connections released.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        }
    }
}

/// One live session.
pub struct Session {
    /// Session ID
    pub id: String,
    /// Conversational state owned by this session for its lifetime.
    ledger: Arc<TurnLedger>,
    /// Lifecycle state
    state: RwLock<SessionState>,
    /// Creation time
    created_at: Instant,
    /// Last inbound audio
    last_audio: RwLock<Instant>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ledger: Arc::new(TurnLedger::new()),
            state: RwLock::new(SessionState::Connecting),
            created_at: Instant::now(),
            last_audio: RwLock::new(Instant::now()),
        }
    }

    /// The conversational state for the agent stage.
    pub fn ledger(&self) -> Arc<TurnLedger> {
        self.ledger.clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Record inbound audio, resetting the idle clock.
    pub fn touch(&self) {
        *self.last_audio.write() = Instant::now();
    }

    /// Instant of the most recent inbound audio.
    pub fn last_audio(&self) -> Instant {
        *self.last_audio.read()
    }

    /// Time since the most recent inbound audio.
    pub fn idle_for(&self) -> Duration {
        self.last_audio.read().elapsed()
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    /// Advance to a later lifecycle state; returns false if already there
    /// or past it. States never move backward.
    fn advance(&self, to: SessionState) -> bool {
        let mut state = self.state.write();
        if *state < to {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Pipeline running, inbound audio accepted.
    pub fn activate(&self) {
        self.advance(SessionState::Active);
    }

    /// Stop accepting inbound audio; let the in-flight turn flush.
    ///
    /// Queued-but-undispatched turns are dropped here: draining exists to
    /// bound shutdown latency, and dispatching them could extend it
    /// arbitrarily.
    pub fn begin_drain(&self) {
        if self.advance(SessionState::Draining) {
            let dropped = self.ledger.drain_pending();
            if dropped > 0 {
                tracing::warn!(
                    session_id = %self.id,
                    dropped,
                    "dropped queued turns while draining"
                );
            }
        }
    }

    /// Close the session. Returns true on the first call; a second close is
    /// a no-op.
    pub fn close(&self) -> bool {
        let closed = self.advance(SessionState::Closed);
        if closed {
            tracing::info!(
                session_id = %self.id,
                turns = self.ledger.turns_completed(),
                "session closed"
            );
        }
        closed
    }
}

/// Process-wide session registry, created and destroyed 1:1 with transport
/// connect/disconnect.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize, session_timeout: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            cleanup_interval,
        }
    }

    /// Start a background task that periodically removes expired sessions.
    ///
    /// Returns a shutdown sender that stops the task. This is a backstop for
    /// sessions whose connection vanished without a clean close; the live
    /// path drains and closes sessions itself.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = manager.count();
                        manager.cleanup_expired();
                        let after = manager.count();
                        if before != after {
                            tracing::info!(
                                removed = before - after,
                                remaining = after,
                                "session cleanup removed expired sessions"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Create a session for a freshly connected transport.
    pub fn create(&self) -> Result<Arc<Session>, ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);
            if sessions.len() >= self.max_sessions {
                return Err(ServerError::Session("max sessions reached".to_string()));
            }
        }

        let session = Arc::new(Session::new());
        sessions.insert(session.id.clone(), session.clone());
        tracing::info!(session_id = %session.id, "created session");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove and close a session.
    pub fn remove(&self, id: &str) {
        let removed = self.sessions.write().remove(id);
        if let Some(session) = removed {
            session.close();
            tracing::info!(session_id = %id, "removed session");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Remove sessions that are closed or idle past the timeout.
    pub fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions);
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.state() == SessionState::Closed || s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(session) = sessions.remove(&id) {
                session.close();
                tracing::info!(session_id = %id, "expired session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(10, Duration::from_secs(60), Duration::from_secs(300))
    }

    #[test]
    fn test_session_lifecycle_is_forward_only() {
        let m = manager();
        let session = m.create().unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        session.activate();
        assert_eq!(session.state(), SessionState::Active);

        session.begin_drain();
        assert_eq!(session.state(), SessionState::Draining);

        // Draining cannot go back to Active.
        session.activate();
        assert_eq!(session.state(), SessionState::Draining);

        assert!(session.close());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_second_close_is_noop() {
        let m = manager();
        let session = m.create().unwrap();
        assert!(session.close());
        assert!(!session.close());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_drain_drops_queued_turns() {
        let m = manager();
        let session = m.create().unwrap();
        session.activate();
        session.ledger().enqueue("queued one".to_string());
        session.ledger().enqueue("queued two".to_string());
        assert_eq!(session.ledger().pending_count(), 2);

        session.begin_drain();
        assert_eq!(session.ledger().pending_count(), 0);
    }

    #[test]
    fn test_create_get_remove() {
        let m = manager();
        let session = m.create().unwrap();
        let id = session.id.clone();

        assert!(m.get(&id).is_some());
        assert_eq!(m.count(), 1);

        m.remove(&id);
        assert!(m.get(&id).is_none());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_capacity_reached() {
        let m = SessionManager::new(1, Duration::from_secs(60), Duration::from_secs(300));
        let _first = m.create().unwrap();
        assert!(m.create().is_err());
    }

    #[test]
    fn test_cleanup_removes_closed_sessions() {
        let m = manager();
        let session = m.create().unwrap();
        session.close();
        m.cleanup_expired();
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn test_cleanup_removes_idle_sessions() {
        let m = SessionManager::new(10, Duration::from_millis(0), Duration::from_secs(300));
        let _session = m.create().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        m.cleanup_expired();
        assert_eq!(m.count(), 0);
    }
}

//! Session registry: the single source of truth for active sessions
//!
//! A session ties an uploaded file to the ephemeral port that serves it and
//! to the one-time token that unlocks that port. The registry owns the
//! session's lifetime: it allocates the port and token on [`offer`] and
//! retires both (deleting the stored file) on [`cleanup`].
//!
//! [`offer`]: SessionStore::offer
//! [`cleanup`]: SessionStore::cleanup

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::PathBuf;

use crate::error::ShareError;
use crate::token::{generate_port, generate_token};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// File persisted, port and token allocated
    Offered,
    /// Ephemeral listener bound and waiting for its peer
    Listening,
    /// Peer connected, file bytes being sent
    Serving,
    /// Transfer over; the port will not serve again
    ///
    /// A session still registered in this state is waiting for the relay's
    /// cleanup or for the expiry sweep.
    Completed,
}

/// An active session
#[derive(Debug, Clone)]
pub struct Session {
    /// Ephemeral port serving the file
    pub port: u16,
    /// One-time access token
    pub token: String,
    /// Where the uploaded bytes are stored
    pub file_path: PathBuf,
    /// Name announced to the receiver in the wire header
    pub filename: String,
    /// Current lifecycle state
    pub state: SessionState,
    /// When the session was offered
    pub created_at: DateTime<Utc>,
}

/// Port and token handed back to the uploader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub port: u16,
    pub token: String,
}

/// Storage for active sessions
///
/// Every operation is atomic with respect to its own port; there are no
/// cross-session transactions.
pub trait SessionStore: Send + Sync {
    /// Allocate an unused port and a fresh token for a stored file
    fn offer(&self, file_path: PathBuf, filename: String) -> Offer;

    /// Snapshot of a session
    fn get(&self, port: u16) -> Option<Session>;

    /// Token guarding a port
    fn token_for(&self, port: u16) -> Option<String>;

    /// Resolve a token to the port it unlocks
    fn port_for_token(&self, token: &str) -> Option<u16>;

    /// Move a session to a new state
    ///
    /// Returns `false` if the session no longer exists.
    fn set_state(&self, port: u16, state: SessionState) -> bool;

    /// Drop a session's mappings without touching its file
    fn release(&self, port: u16) -> Option<Session>;

    /// Delete the stored file and retire the port and token
    ///
    /// Deletion failures are logged and never block mapping removal.
    /// Returns `false` if the port was not registered.
    fn cleanup(&self, port: u16) -> bool;

    /// Clean up sessions older than `max_age` that are not mid-transfer
    ///
    /// Returns the number of sessions retired.
    fn cleanup_expired(&self, max_age: Duration) -> usize;

    /// Number of active sessions
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored file location for a port
    fn file_path(&self, port: u16) -> Option<PathBuf> {
        self.get(port).map(|session| session.file_path)
    }
}

/// Sharded in-memory session registry
///
/// `tokens` is an index over `sessions`. A `tokens` shard lock is never held
/// while a `sessions` shard lock is being acquired.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<u16, Session>,
    tokens: DashMap<String, u16>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw tokens until one is not held by another active session
    fn reserve_token(&self, port: u16) -> String {
        loop {
            let token = generate_token();
            if let Entry::Vacant(slot) = self.tokens.entry(token.clone()) {
                slot.insert(port);
                return token;
            }
            tracing::debug!(port, "Token collision, drawing again");
        }
    }

    /// Remove the token index entry only if it still points at `port`
    fn forget_token(&self, token: &str, port: u16) {
        self.tokens.remove_if(token, |_, owner| *owner == port);
    }

    /// Delete a released session's file
    fn retire(&self, session: Session) {
        match std::fs::remove_file(&session.file_path) {
            Ok(()) => {
                tracing::info!("File deleted after download: {}", session.file_path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Stored file already gone: {}", session.file_path.display());
            }
            Err(e) => {
                let err = ShareError::StorageIo(e);
                tracing::warn!(
                    "Failed to delete {}: {}",
                    session.file_path.display(),
                    err
                );
            }
        }

        tracing::info!(port = session.port, "Cleaned up port and associated token");
    }

    /// Clean up `port` only if it is still expired under the shard lock
    ///
    /// A session that started serving after it was picked as a candidate is
    /// left alone.
    fn cleanup_if_expired(&self, port: u16, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Some((_, session)) = self
            .sessions
            .remove_if(&port, |_, session| is_expired(session, now, max_age))
        else {
            return false;
        };
        self.forget_token(&session.token, port);
        self.retire(session);
        true
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, port: u16, by: Duration) {
        if let Some(mut session) = self.sessions.get_mut(&port) {
            session.created_at = session.created_at - by;
        }
    }
}

fn is_expired(session: &Session, now: DateTime<Utc>, max_age: Duration) -> bool {
    session.state != SessionState::Serving && now.signed_duration_since(session.created_at) >= max_age
}

impl SessionStore for SessionRegistry {
    fn offer(&self, file_path: PathBuf, filename: String) -> Offer {
        // The port space dwarfs the number of concurrent sessions, so this
        // loop terminates quickly in practice.
        loop {
            let port = generate_port();
            let Entry::Vacant(slot) = self.sessions.entry(port) else {
                continue;
            };

            let token = self.reserve_token(port);
            slot.insert(Session {
                port,
                token: token.clone(),
                file_path,
                filename,
                state: SessionState::Offered,
                created_at: Utc::now(),
            });

            tracing::info!(port, "Session offered");
            return Offer { port, token };
        }
    }

    fn get(&self, port: u16) -> Option<Session> {
        self.sessions.get(&port).map(|session| session.clone())
    }

    fn token_for(&self, port: u16) -> Option<String> {
        self.sessions.get(&port).map(|session| session.token.clone())
    }

    fn port_for_token(&self, token: &str) -> Option<u16> {
        self.tokens.get(token).map(|port| *port)
    }

    fn set_state(&self, port: u16, state: SessionState) -> bool {
        match self.sessions.get_mut(&port) {
            Some(mut session) => {
                tracing::debug!(port, from = ?session.state, to = ?state, "Session state change");
                session.state = state;
                true
            }
            None => false,
        }
    }

    fn release(&self, port: u16) -> Option<Session> {
        let (_, session) = self.sessions.remove(&port)?;
        self.forget_token(&session.token, port);
        Some(session)
    }

    fn cleanup(&self, port: u16) -> bool {
        match self.release(port) {
            Some(session) => {
                self.retire(session);
                true
            }
            None => false,
        }
    }

    fn cleanup_expired(&self, max_age: Duration) -> usize {
        let now = Utc::now();

        // Collect first: cleaning up while iterating would deadlock on the shard.
        let candidates: Vec<u16> = self
            .sessions
            .iter()
            .filter(|session| is_expired(session, now, max_age))
            .map(|session| session.port)
            .collect();

        candidates
            .into_iter()
            .filter(|port| self.cleanup_if_expired(*port, now, max_age))
            .count()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EPHEMERAL_PORT_START;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn stored_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"payload").unwrap();
        path
    }

    #[test]
    fn test_offer_registers_port_and_token() {
        let registry = SessionRegistry::new();
        let offer = registry.offer(PathBuf::from("/tmp/a.txt"), "a.txt".to_string());

        assert!(offer.port >= EPHEMERAL_PORT_START);
        assert_eq!(offer.token.len(), 6);
        assert_eq!(registry.token_for(offer.port), Some(offer.token.clone()));
        assert_eq!(registry.port_for_token(&offer.token), Some(offer.port));
        assert_eq!(registry.file_path(offer.port), Some(PathBuf::from("/tmp/a.txt")));

        let session = registry.get(offer.port).unwrap();
        assert_eq!(session.state, SessionState::Offered);
        assert_eq!(session.filename, "a.txt");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = SessionRegistry::new();
        assert!(registry.token_for(50000).is_none());
        assert!(registry.port_for_token("123456").is_none());
        assert!(registry.get(50000).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ports_and_tokens_unique_among_active_sessions() {
        let registry = SessionRegistry::new();
        let mut ports = HashSet::new();
        let mut tokens = HashSet::new();

        for i in 0..2_000 {
            let offer = registry.offer(PathBuf::from(format!("/tmp/{i}")), format!("{i}.txt"));
            assert!(ports.insert(offer.port), "port {} handed out twice", offer.port);
            assert!(tokens.insert(offer.token.clone()), "token {} handed out twice", offer.token);
        }
        assert_eq!(registry.len(), 2_000);
    }

    #[test]
    fn test_concurrent_offers_never_share_a_port() {
        let registry = Arc::new(SessionRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..200)
                        .map(|i| {
                            registry
                                .offer(PathBuf::from(format!("/tmp/{t}-{i}")), "f.txt".into())
                                .port
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for port in handle.join().unwrap() {
                assert!(seen.insert(port));
            }
        }
        assert_eq!(registry.len(), 1_600);
    }

    #[test]
    fn test_set_state() {
        let registry = SessionRegistry::new();
        let offer = registry.offer(PathBuf::from("/tmp/a.txt"), "a.txt".into());

        assert!(registry.set_state(offer.port, SessionState::Listening));
        assert_eq!(registry.get(offer.port).unwrap().state, SessionState::Listening);
        assert!(registry.set_state(offer.port, SessionState::Serving));
        assert_eq!(registry.get(offer.port).unwrap().state, SessionState::Serving);

        registry.release(offer.port);
        assert!(!registry.set_state(offer.port, SessionState::Listening));
    }

    #[test]
    fn test_cleanup_deletes_file_and_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let path = stored_file(&dir, "a.txt");
        let registry = SessionRegistry::new();
        let offer = registry.offer(path.clone(), "a.txt".into());

        assert!(registry.cleanup(offer.port));
        assert!(!path.exists());
        assert!(registry.token_for(offer.port).is_none());
        assert!(registry.port_for_token(&offer.token).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let offer = registry.offer(stored_file(&dir, "a.txt"), "a.txt".into());

        assert!(registry.cleanup(offer.port));
        assert!(!registry.cleanup(offer.port));
        assert!(!registry.cleanup(1));
    }

    #[test]
    fn test_cleanup_with_missing_file_still_removes_mappings() {
        let registry = SessionRegistry::new();
        let offer = registry.offer(PathBuf::from("/nonexistent/peerlink/a.txt"), "a.txt".into());

        assert!(registry.cleanup(offer.port));
        assert!(registry.port_for_token(&offer.token).is_none());
    }

    #[test]
    fn test_cleanup_only_touches_its_own_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();
        let first = registry.offer(stored_file(&dir, "one.txt"), "one.txt".into());
        let second_path = stored_file(&dir, "two.txt");
        let second = registry.offer(second_path.clone(), "two.txt".into());

        registry.cleanup(first.port);

        assert!(second_path.exists());
        assert_eq!(registry.port_for_token(&second.token), Some(second.port));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_release_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = stored_file(&dir, "a.txt");
        let registry = SessionRegistry::new();
        let offer = registry.offer(path.clone(), "a.txt".into());

        let released = registry.release(offer.port).unwrap();
        assert_eq!(released.token, offer.token);
        assert!(path.exists());
        assert!(registry.port_for_token(&offer.token).is_none());
        assert!(registry.release(offer.port).is_none());
    }

    #[test]
    fn test_cleanup_expired() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new();

        let fresh = registry.offer(stored_file(&dir, "fresh.txt"), "fresh.txt".into());
        let old_path = stored_file(&dir, "old.txt");
        let old = registry.offer(old_path.clone(), "old.txt".into());
        let busy = registry.offer(stored_file(&dir, "busy.txt"), "busy.txt".into());

        registry.backdate(old.port, Duration::hours(2));
        registry.backdate(busy.port, Duration::hours(2));
        registry.set_state(old.port, SessionState::Listening);
        registry.set_state(busy.port, SessionState::Serving);

        let cleaned = registry.cleanup_expired(Duration::hours(1));
        assert_eq!(cleaned, 1);
        assert!(!old_path.exists());
        assert!(registry.get(old.port).is_none());
        assert!(registry.get(fresh.port).is_some());
        assert!(registry.get(busy.port).is_some());
    }

    #[test]
    fn test_cleanup_expired_nothing_old() {
        let registry = SessionRegistry::new();
        registry.offer(PathBuf::from("/tmp/a"), "a".into());
        registry.offer(PathBuf::from("/tmp/b"), "b".into());

        assert_eq!(registry.cleanup_expired(Duration::hours(1)), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_expired_session_that_started_serving_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = stored_file(&dir, "a.txt");
        let registry = SessionRegistry::new();
        let offer = registry.offer(path.clone(), "a.txt".into());
        registry.backdate(offer.port, Duration::hours(2));
        let now = Utc::now();

        // Picked as a candidate, then claimed by its server before the sweep
        // reaches it.
        registry.set_state(offer.port, SessionState::Serving);

        assert!(!registry.cleanup_if_expired(offer.port, now, Duration::hours(1)));
        assert!(path.exists());
        assert_eq!(registry.port_for_token(&offer.token), Some(offer.port));
    }

    #[test]
    fn test_cleanup_if_expired_retires_idle_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = stored_file(&dir, "a.txt");
        let registry = SessionRegistry::new();
        let offer = registry.offer(path.clone(), "a.txt".into());
        registry.backdate(offer.port, Duration::hours(2));

        assert!(registry.cleanup_if_expired(offer.port, Utc::now(), Duration::hours(1)));
        assert!(!path.exists());
        assert!(registry.port_for_token(&offer.token).is_none());
        assert!(!registry.cleanup_if_expired(offer.port, Utc::now(), Duration::hours(1)));
    }

    #[test]
    fn test_cleanup_expired_takes_finished_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = stored_file(&dir, "a.txt");
        let registry = SessionRegistry::new();
        let offer = registry.offer(path.clone(), "a.txt".into());
        registry.set_state(offer.port, SessionState::Completed);
        registry.backdate(offer.port, Duration::hours(2));

        assert_eq!(registry.cleanup_expired(Duration::hours(1)), 1);
        assert!(!path.exists());
        assert!(registry.is_empty());
    }
}

//! Server-side session store.
//!
//! Sessions hold exactly one thing: the bearer token bound to a browser.
//! Entries live in a concurrent map keyed by [`SessionId`] and expire after
//! an idle TTL. Expiry is enforced lazily on access; there is no sweeper
//! thread.
//!
//! The store is always passed explicitly (a [`SessionHandle`] goes into every
//! resolver call), so there is no ambient session global to reason about.

use crate::ids::SessionId;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct SessionEntry {
    token: Option<String>,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            token: None,
            last_seen: Instant::now(),
        }
    }
}

/// Concurrent session store with lazy idle expiry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Open the session named by a cookie value, or start a fresh one.
    ///
    /// A fresh session gets an id immediately but no store entry; the entry
    /// is created only when a token is bound. Presenting an unknown or
    /// expired id behaves exactly like presenting no cookie at all.
    pub fn open(&self, cookie_value: Option<&str>) -> SessionHandle<'_> {
        if let Some(id) = cookie_value.and_then(SessionId::from_cookie) {
            if self.is_live(&id) {
                return SessionHandle {
                    store: self,
                    id,
                    started_fresh: false,
                };
            }
            debug!(session_id = %id, "session cookie expired or unknown, starting fresh");
        }
        SessionHandle {
            store: self,
            id: SessionId::new(),
            started_fresh: true,
        }
    }

    /// Handle for a known session id, e.g. from a parsed request.
    pub fn handle(&self, id: SessionId) -> SessionHandle<'_> {
        SessionHandle {
            store: self,
            id,
            started_fresh: false,
        }
    }

    fn is_live(&self, id: &SessionId) -> bool {
        let expired = match self.sessions.get(id) {
            Some(entry) => entry.last_seen.elapsed() > self.ttl,
            None => return false,
        };
        if expired {
            self.sessions.remove(id);
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// A borrowed view of one session in the store.
///
/// Holding a handle does not pin the entry; the entry appears when a token
/// is bound and disappears on invalidation or idle expiry.
#[derive(Debug, Clone, Copy)]
pub struct SessionHandle<'a> {
    store: &'a SessionStore,
    id: SessionId,
    started_fresh: bool,
}

impl SessionHandle<'_> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// True when this request did not present a usable session cookie.
    pub fn started_fresh(&self) -> bool {
        self.started_fresh
    }

    /// The bound token, if any. Touches the idle timer.
    pub fn token(&self) -> Option<String> {
        let mut entry = self.store.sessions.get_mut(&self.id)?;
        if entry.last_seen.elapsed() > self.store.ttl {
            drop(entry);
            self.store.sessions.remove(&self.id);
            return None;
        }
        entry.last_seen = Instant::now();
        entry.token.clone()
    }

    /// Bind a token to this session, creating the entry if needed.
    ///
    /// Empty tokens are never written; a binding either holds a non-empty
    /// credential or does not exist.
    pub fn bind_token(&self, token: &str) {
        if token.trim().is_empty() {
            warn!(session_id = %self.id, "refusing to bind empty token to session");
            return;
        }
        let mut entry = self
            .store
            .sessions
            .entry(self.id)
            .or_insert_with(SessionEntry::new);
        entry.token = Some(token.to_string());
        entry.last_seen = Instant::now();
    }

    /// Remove the session entry entirely (logout).
    pub fn invalidate(&self) {
        if self.store.sessions.remove(&self.id).is_some() {
            debug!(session_id = %self.id, "session invalidated");
        }
    }

    /// True when the store currently holds an entry for this id.
    pub fn exists(&self) -> bool {
        self.store.sessions.contains_key(&self.id)
    }
}

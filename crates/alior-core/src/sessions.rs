//! Concurrent per-user session store

use alior_util::{Clock, UserId};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::Session;

/// Map from user to conversation session.
///
/// Callers get owned copies and write them back with [`SessionStore::save`],
/// so the lock is only held for a single map operation. Saves are
/// compare-and-swap on [`Session::generation`]: of two copies taken from the
/// same version, only the first written back is kept.
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Current time according to the injected clock
    pub fn now(&self) -> DateTime<Local> {
        self.clock.now()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Session>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Existing session for the user, or a fresh Idle one. Refreshes last activity.
    pub fn get_or_create(&self, user: UserId) -> Session {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let session = sessions.entry(user).or_insert_with(|| {
            trace!(user_id = %user, "Session created");
            Session::new(user, now)
        });
        session.last_activity = now;
        session.clone()
    }

    /// Refresh last activity. Returns false if the user has no session.
    pub fn touch(&self, user: UserId) -> bool {
        let now = self.clock.now();
        match self.lock().get_mut(&user) {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    /// Write back a session advanced by the state machine.
    ///
    /// Returns false, leaving the stored session alone, when it changed since
    /// `session` was taken from it. A session evicted in the meantime is
    /// written back as is.
    pub fn save(&self, mut session: Session) -> bool {
        let mut sessions = self.lock();
        if let Some(current) = sessions.get(&session.user_id) {
            if current.generation() != session.generation() {
                debug!(
                    user_id = %session.user_id,
                    stored = current.generation(),
                    stale = session.generation(),
                    "Stale session write rejected"
                );
                return false;
            }
            session.last_activity = session.last_activity.max(current.last_activity);
        }
        session.bump_generation();
        sessions.insert(session.user_id, session);
        true
    }

    /// Reset the user's session to Idle without drafts
    pub fn clear(&self, user: UserId) {
        if let Some(session) = self.lock().get_mut(&user) {
            session.reset();
            session.bump_generation();
        }
    }

    /// Remove the user's session. Returns whether one existed.
    pub fn delete(&self, user: UserId) -> bool {
        self.lock().remove(&user).is_some()
    }

    /// Point-in-time `(user, last activity)` pairs
    pub fn snapshot(&self) -> Vec<(UserId, DateTime<Local>)> {
        self.lock()
            .values()
            .map(|s| (s.user_id, s.last_activity))
            .collect()
    }

    /// Remove the session only if it has been idle since before `cutoff`.
    ///
    /// The check runs under the lock, so a user who became active after a
    /// snapshot was taken keeps their session.
    pub fn remove_if_idle(&self, user: UserId, cutoff: DateTime<Local>) -> bool {
        let mut sessions = self.lock();
        let idle = sessions
            .get(&user)
            .is_some_and(|s| s.last_activity < cutoff);
        if idle {
            sessions.remove(&user);
            debug!(user_id = %user, "Idle session evicted");
        }
        idle
    }

    /// Copy of the user's session, if any, without refreshing it
    pub fn peek(&self, user: UserId) -> Option<Session> {
        self.lock().get(&user).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

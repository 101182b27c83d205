//! Session manager with idle expiry.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{Session, SessionId};
use crate::cache::Clock;
use crate::config::DEFAULT_CLEANUP_INTERVAL;
use crate::error::{Error, Result};

/// Shared, lockable handle to one session.
///
/// Holding the lock is what makes runs of a session sequential.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Owns every open session of an app.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<SessionId, SessionHandle>,
    idle_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create a manager. Sessions idle longer than `idle_timeout` are expired
    /// by `expire_idle`; `None` keeps them until closed.
    pub fn new(idle_timeout: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            clock,
        }
    }

    /// Open a new, empty session.
    pub fn open(&self) -> SessionId {
        let id = SessionId::new();
        let session = Session::new(id, self.clock.now());
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        debug!(session_id = %id, open = self.sessions.len(), "session opened");
        id
    }

    /// Look up an open session.
    pub fn get(&self, id: SessionId) -> Result<SessionHandle> {
        let handle = self
            .sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::SessionNotFound(id))?;
        trace!(session_id = %id, "session accessed");
        Ok(handle)
    }

    /// Close a session, discarding its state. Returns false if it was not open.
    pub fn close(&self, id: SessionId) -> bool {
        let closed = self.sessions.remove(&id).is_some();
        if closed {
            debug!(session_id = %id, "session closed");
        }
        closed
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Close every session idle for longer than the timeout.
    ///
    /// A session in the middle of a run is never expired. Returns the closed ids.
    pub fn expire_idle(&self) -> Vec<SessionId> {
        let Some(timeout) = self.idle_timeout else {
            return Vec::new();
        };
        let now = self.clock.now();

        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                let session = entry.value().try_lock()?;
                is_idle(&session, now, timeout).then_some(*entry.key())
            })
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.expire_if_idle(*id, now, timeout))
            .collect()
    }

    // The scan above released every session lock, so a run may have started
    // or finished since; decide again under the map's write lock.
    fn expire_if_idle(&self, id: SessionId, now: Instant, timeout: Duration) -> bool {
        let removed = self
            .sessions
            .remove_if(&id, |_, handle| {
                handle
                    .try_lock()
                    .is_some_and(|session| is_idle(&session, now, timeout))
            })
            .is_some();
        if removed {
            debug!(session_id = %id, "session expired");
        }
        removed
    }

    /// Run `expire_idle` every `interval` on the tokio runtime.
    ///
    /// A zero interval falls back to [`DEFAULT_CLEANUP_INTERVAL`]. The task
    /// ends on its own once the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let period = if interval.is_zero() {
            warn!(fallback = ?DEFAULT_CLEANUP_INTERVAL, "zero reaper interval");
            DEFAULT_CLEANUP_INTERVAL
        } else {
            interval
        };
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let expired = manager.expire_idle();
                if !expired.is_empty() {
                    debug!(count = expired.len(), "reaper expired idle sessions");
                }
            }
        })
    }
}

fn is_idle(session: &Session, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(session.last_active()) > timeout
}

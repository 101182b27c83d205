//! Sessions
//!
//! A session is one user's interaction stream with an app. It owns the
//! `SessionState` and widget bindings that survive between runs, and it is
//! the unit of mutual exclusion: at most one run executes per session at a
//! time, while different sessions run concurrently.

mod manager;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::state::{SessionState, WidgetRegistry};

pub use manager::{SessionHandle, SessionManager};

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Everything one session keeps between runs.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    widgets: WidgetRegistry,
    created_at: Instant,
    last_active: Instant,
    run_count: u64,
}

impl Session {
    /// Create an empty session opened at `now`.
    pub fn new(id: SessionId, now: Instant) -> Self {
        Self {
            id,
            state: SessionState::new(),
            widgets: WidgetRegistry::new(),
            created_at: now,
            last_active: now,
            run_count: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn widgets(&self) -> &WidgetRegistry {
        &self.widgets
    }

    /// Split borrow used by the script runner.
    pub(crate) fn parts_mut(&mut self) -> (&mut SessionState, &mut WidgetRegistry) {
        (&mut self.state, &mut self.widgets)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// Record activity at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    /// Number of runs started in this session, reruns included.
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub(crate) fn record_run(&mut self) {
        self.run_count += 1;
    }
}

//! App
//!
//! An `App` ties one script to the shared caches and the open sessions.
//! It is the entry point a display surface talks to: open a session, feed
//! it events, send back the render tree of each outcome.
//!
//! `App` is cheap to clone and every clone refers to the same sessions and
//! caches, so it can be handed to as many connection tasks as needed.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheRegistry;
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::script::{Event, RunOutcome, ScriptContext, ScriptRunner};
use crate::session::{SessionHandle, SessionId, SessionManager};

/// A script served to many sessions.
#[derive(Debug, Clone)]
pub struct App {
    config: Arc<RuntimeConfig>,
    caches: CacheRegistry,
    sessions: Arc<SessionManager>,
    runner: ScriptRunner,
}

impl App {
    /// Create an app running `script`.
    ///
    /// Caches the script uses should be created from `caches` beforehand and
    /// moved into the closure, so every session sees the same ones. Sessions
    /// read time from the registry's clock.
    pub fn new<F>(config: RuntimeConfig, caches: CacheRegistry, script: F) -> Self
    where
        F: Fn(&mut ScriptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let sessions = SessionManager::new(config.session_idle_timeout, Arc::clone(caches.clock()));
        let runner = ScriptRunner::new(script, config.max_reruns_per_event);
        info!(
            max_reruns = config.max_reruns_per_event,
            idle_timeout = ?config.session_idle_timeout,
            "app created"
        );
        Self {
            config: Arc::new(config),
            caches,
            sessions: Arc::new(sessions),
            runner,
        }
    }

    /// Open a session. Its first page comes from `handle(id, None)`.
    pub fn open_session(&self) -> SessionId {
        self.sessions.open()
    }

    /// Close a session and discard its state.
    pub fn close_session(&self, id: SessionId) -> bool {
        self.sessions.close(id)
    }

    /// Run the script for one event of one session.
    ///
    /// `None` is the initial page load. Blocks while another run of the same
    /// session is in progress; runs of different sessions proceed in parallel.
    pub fn handle(&self, id: SessionId, event: Option<Event>) -> Result<RunOutcome> {
        let handle = self.sessions.get(id)?;
        let mut session = handle.lock();
        // Expired or closed while this call waited for the lock.
        if !self.sessions.contains(id) {
            return Err(Error::SessionNotFound(id));
        }
        session.touch(self.caches.clock().now());
        debug!(session_id = %id, ?event, "handling event");
        self.runner.run(&mut session, &self.caches, event)
    }

    /// Direct access to a session, for inspection.
    pub fn session(&self, id: SessionId) -> Result<SessionHandle> {
        self.sessions.get(id)
    }

    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    /// Start the idle-session reaper at the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        self.sessions.spawn_reaper(self.config.cleanup_interval)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

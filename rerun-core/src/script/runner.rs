//! Script Runner
//!
//! The runner is the re-executor: it runs the page-definition function from
//! top to bottom once per event, against one session's state.
//!
//! # How A Run Works
//!
//! 1. If the event targets a widget, the widget's new value is committed to
//!    `SessionState` under the widget's key.
//!
//!    A form submission commits every member value at once, then marks the
//!    submit button that was pressed. Nothing is committed if any value
//!    does not belong to that button's form.
//!
//! 2. If that widget registered a callback, it runs exactly once, with the
//!    new value already visible, before any page logic. A callback that
//!    calls `stop` ends the run before the body; one that asks for a rerun
//!    changes nothing, since the body runs next anyway.
//!
//! 3. The script body runs. Display calls append to a fresh render tree in
//!    the order they execute.
//!
//! 4. The body's result decides what happens next:
//!    - `Ok`: the run completed. Bindings of widgets it did not render are
//!      dropped, along with the state of implicitly keyed ones.
//!    - `StopRequested`: the run ends where it stopped. State written so
//!      far persists.
//!    - `RerunRequested`: the tree is discarded and a new run starts at once
//!      with the state as it is, and no event.
//!    - any other error: state written by the body is rolled back, the
//!      tree ends with an `Exception` element, and the run ends.
//!
//! 5. Button values reset to `false` so a click triggers one run only.
//!
//! Runs are synchronous. The caller holds the session exclusively for the
//! whole call, which is what keeps runs of one session sequential.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::context::ScriptContext;
use super::element::{Element, RenderTree};
use super::event::Event;
use crate::cache::CacheRegistry;
use crate::error::{Error, Result};
use crate::session::{Session, SessionId};
use crate::state::{Callback, SessionState, WidgetId, WidgetKind, WidgetRegistry};

/// How the last run of an event ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum RunStatus {
    /// The script body returned normally.
    Completed,
    /// Page logic called `stop`.
    Stopped,
    /// A callback or the script body failed; the message is user-visible.
    Failed(String),
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Render tree of the final run.
    pub tree: RenderTree,
    pub status: RunStatus,
    /// Runs executed for this event: 1 plus the number of reruns.
    pub runs: usize,
}

/// Page-definition logic.
pub type ScriptFn = dyn Fn(&mut ScriptContext<'_>) -> Result<()> + Send + Sync;

/// Outcome of a single pass.
enum Pass {
    Finished(RenderTree, RunStatus),
    Rerun,
}

/// Runs a script against sessions.
#[derive(Clone)]
pub struct ScriptRunner {
    script: Arc<ScriptFn>,
    max_reruns: usize,
    total_runs: Arc<AtomicU64>,
}

impl ScriptRunner {
    /// Wrap page logic. `max_reruns` bounds consecutive reruns per event.
    pub fn new<F>(script: F, max_reruns: usize) -> Self
    where
        F: Fn(&mut ScriptContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            max_reruns,
            total_runs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle one event (or the initial page load, with `None`).
    pub fn run(
        &self,
        session: &mut Session,
        caches: &CacheRegistry,
        event: Option<Event>,
    ) -> Result<RunOutcome> {
        let mut pending = event;
        let mut runs = 0;

        loop {
            if runs > self.max_reruns {
                warn!(session_id = %session.id(), limit = self.max_reruns, "rerun limit exceeded");
                return Err(Error::RerunLimitExceeded(self.max_reruns));
            }
            runs += 1;

            match self.pass(session, caches, pending.take())? {
                Pass::Finished(tree, status) => {
                    debug!(session_id = %session.id(), runs, ?status, elements = tree.len(), "run finished");
                    return Ok(RunOutcome { tree, status, runs });
                }
                Pass::Rerun => {
                    debug!(session_id = %session.id(), "rerun requested");
                }
            }
        }
    }

    fn pass(&self, session: &mut Session, caches: &CacheRegistry, event: Option<Event>) -> Result<Pass> {
        session.record_run();
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        let session_id = session.id();
        let (state, widgets) = session.parts_mut();

        let triggered_by = match event {
            Some(Event::WidgetChanged { id, value }) => {
                let binding = widgets
                    .get(&id)
                    .ok_or_else(|| Error::UnknownWidget(id.to_string()))?;
                if binding.is_deferred() {
                    return Err(Error::DeferredWidget(id.to_string()));
                }
                let callback = binding.callback.clone();
                state.set_value(id.as_str(), value);

                if let Some(pass) = fire_callback(session_id, &id, callback, state, widgets) {
                    return Ok(pass);
                }
                Some(id)
            }
            Some(Event::FormSubmitted { submitter, values }) => {
                let callback = submission_callback(widgets, &submitter, &values)?;
                debug!(session_id = %session_id, submitter = %submitter, values = values.len(), "form submitted");
                for (id, value) in values {
                    state.set_value(id.as_str(), value);
                }
                state.set_value(submitter.as_str(), Value::Bool(true));

                if let Some(pass) = fire_callback(session_id, &submitter, callback, state, widgets) {
                    return Ok(pass);
                }
                Some(submitter)
            }
            Some(Event::Rerun) | None => None,
        };

        widgets.begin_run();
        let snapshot = state.clone();
        let mut ctx = ScriptContext::new(session_id, state, widgets, caches, triggered_by);
        let result = (self.script)(&mut ctx);
        let tree = ctx.into_tree();

        let pass = match result {
            Ok(()) => {
                for id in widgets.finish_run() {
                    if id.is_implicit() {
                        state.remove(id.as_str());
                    }
                }
                Pass::Finished(tree, RunStatus::Completed)
            }
            Err(Error::StopRequested) => Pass::Finished(tree, RunStatus::Stopped),
            Err(Error::RerunRequested) => Pass::Rerun,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "script failed");
                *state = snapshot;
                Pass::Finished(failure_tree(tree, &err), failed(&err))
            }
        };

        reset_triggers(state, widgets);
        Ok(pass)
    }

    /// Runs executed by this runner across all sessions, reruns included.
    pub fn total_runs(&self) -> u64 {
        self.total_runs.load(Ordering::Relaxed)
    }

    pub fn max_reruns(&self) -> usize {
        self.max_reruns
    }
}

impl fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRunner")
            .field("max_reruns", &self.max_reruns)
            .field("total_runs", &self.total_runs())
            .finish_non_exhaustive()
    }
}

/// Check a form submission before anything is committed and return the
/// submit button's callback.
fn submission_callback(
    widgets: &WidgetRegistry,
    submitter: &WidgetId,
    values: &IndexMap<WidgetId, Value>,
) -> Result<Option<Callback>> {
    let button = widgets
        .get(submitter)
        .ok_or_else(|| Error::UnknownWidget(submitter.to_string()))?;
    let (WidgetKind::FormSubmit, Some(form)) = (button.kind, button.form.as_deref()) else {
        return Err(Error::InvalidFormSubmission(format!(
            "{submitter} is not a form submit button"
        )));
    };

    for id in values.keys() {
        let member = widgets
            .get(id)
            .ok_or_else(|| Error::UnknownWidget(id.to_string()))?;
        if !member.is_deferred() || member.form.as_deref() != Some(form) {
            return Err(Error::InvalidFormSubmission(format!(
                "{id} is not a member of form {form:?}"
            )));
        }
    }
    Ok(button.callback.clone())
}

/// Invoke the triggering widget's callback, if it has one.
///
/// Returns the finished pass when the body must not run.
fn fire_callback(
    session_id: SessionId,
    id: &WidgetId,
    callback: Option<Callback>,
    state: &mut SessionState,
    widgets: &WidgetRegistry,
) -> Option<Pass> {
    let callback = callback?;
    let committed = state.clone();
    match callback.invoke(state) {
        Ok(()) | Err(Error::RerunRequested) => None,
        Err(Error::StopRequested) => {
            debug!(session_id = %session_id, widget = %id, "callback stopped the run");
            reset_triggers(state, widgets);
            Some(Pass::Finished(RenderTree::new(), RunStatus::Stopped))
        }
        Err(err) => {
            warn!(session_id = %session_id, widget = %id, error = %err, "callback failed");
            *state = committed;
            reset_triggers(state, widgets);
            Some(Pass::Finished(failure_tree(RenderTree::new(), &err), failed(&err)))
        }
    }
}

fn failed(err: &Error) -> RunStatus {
    RunStatus::Failed(err.to_string())
}

fn failure_tree(mut tree: RenderTree, err: &Error) -> RenderTree {
    tree.push(Element::Exception {
        message: err.to_string(),
    });
    tree
}

fn reset_triggers(state: &mut SessionState, widgets: &WidgetRegistry) {
    for id in widgets.trigger_ids() {
        reset_trigger(state, &id);
    }
}

fn reset_trigger(state: &mut SessionState, id: &WidgetId) {
    if state.has(id.as_str()) {
        state.set_value(id.as_str(), serde_json::Value::Bool(false));
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

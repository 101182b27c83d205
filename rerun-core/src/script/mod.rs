//! Script Re-executor
//!
//! Page logic is an ordinary function. It is not a tree of callbacks or a
//! retained UI: every event runs it again from the top, and whatever it
//! displays during that run is the page.
//!
//! # Pieces
//!
//! - [`ScriptContext`]: the handle page logic receives. Display calls,
//!   widget calls, state access, caches, and the stop/rerun signals.
//! - [`RenderTree`]: the ordered [`Element`]s one run produced.
//! - [`Event`]: what caused a run.
//! - [`ScriptRunner`]: applies the event, fires the widget's callback, runs
//!   the body and turns its result into a [`RunOutcome`].
//!
//! # Example
//!
//! ```rust,ignore
//! let runner = ScriptRunner::new(|ctx| {
//!     ctx.state_mut().init("count", 0)?;
//!     if ctx.button("Increment", WidgetOptions::new())? {
//!         ctx.state_mut().update::<i64, _>("count", |c| c + 1)?;
//!     }
//!     let count: i64 = ctx.state().get_as("count")?;
//!     ctx.write(&format!("Count = {count}"))
//! }, 100);
//! ```

mod context;
mod element;
mod event;
mod runner;

pub use context::{ScriptContext, WidgetOptions};
pub use element::{AlertLevel, Element, RenderTree};
pub use event::Event;
pub use runner::{RunOutcome, RunStatus, ScriptFn, ScriptRunner};

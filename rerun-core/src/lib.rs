//! Rerun Core
//!
//! This crate provides the core runtime for script-style interactive apps,
//! where the whole page is an ordinary function re-executed on every user
//! interaction. It implements:
//!
//! - Per-session state that survives re-execution
//! - Data and resource caches shared across sessions
//! - The script re-executor: events, callbacks, stop and rerun signals
//!
//! Transport and rendering are left to the embedding surface, which receives
//! each run's output as a serializable render tree.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `state`: Session state store and widget bindings
//! - `cache`: Data and resource caches and their registry
//! - `script`: Script context, render tree, events and the runner
//! - `session`: Sessions and the session manager
//! - `app`: One script served to many sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use rerun_core::{App, CacheRegistry, Event, RuntimeConfig, WidgetId, WidgetOptions};
//!
//! let app = App::new(RuntimeConfig::new(), CacheRegistry::new(), |ctx| {
//!     ctx.state_mut().init("counter", 0)?;
//!     if ctx.button("Increment", WidgetOptions::new().key("inc"))? {
//!         ctx.state_mut().update::<i64, _>("counter", |c| c + 1)?;
//!     }
//!     let counter: i64 = ctx.state().get_as("counter")?;
//!     ctx.write(&format!("Counter: {counter}"))
//! });
//!
//! let session = app.open_session();
//! app.handle(session, None)?;
//! let outcome = app.handle(session, Some(Event::click(WidgetId::explicit("inc"))))?;
//! // outcome.tree ends with "Counter: 1"
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod script;
pub mod session;
pub mod state;

pub use app::App;
pub use cache::{CacheRegistry, DataCache, DataCacheOptions, ResourceCache};
pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use script::{Element, Event, RenderTree, RunOutcome, RunStatus, ScriptContext, WidgetOptions};
pub use session::SessionId;
pub use state::{Callback, SessionState, WidgetId};

//! Session State
//!
//! Persisted interactive state for one session: the key/value store and the
//! bindings that tie rendered widgets to keys in it.
//!
//! # Concepts
//!
//! ## SessionState
//!
//! A mapping from string keys to JSON values. It is created empty when a
//! session opens, survives every run of that session, and is discarded when
//! the session closes. Page logic reads and writes it directly; widgets bound
//! to a key write their committed input into it.
//!
//! ## Widget bindings
//!
//! Each rendered widget has a `WidgetId`, either an explicit key or an id
//! derived from its content. The id doubles as the widget's state key. A
//! binding may carry a `Callback` with bound arguments, fired by the script
//! runner before the run the widget's event triggers.

mod session_state;
mod widget;

pub use session_state::SessionState;
pub use widget::{Callback, CallbackArgs, WidgetBinding, WidgetId, WidgetKind, WidgetRegistry};

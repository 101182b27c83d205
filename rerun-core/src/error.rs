//! Error types for the rerun core.
//!
//! Two of the variants are not failures at all: [`Error::StopRequested`] and
//! [`Error::RerunRequested`] are control signals raised by page logic through
//! [`ScriptContext::stop`](crate::script::ScriptContext::stop) and
//! [`ScriptContext::rerun`](crate::script::ScriptContext::rerun). They travel
//! through `?` like any other error so the script body unwinds immediately,
//! and the script runner consumes them. They never reach an end user.

use crate::session::SessionId;

/// Boxed error returned by user computations wrapped in a cache.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for session state, cache and script execution operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `SessionState::get` on a key that was never set and has no default.
    #[error("key not found in session state: {0}")]
    KeyNotFound(String),

    /// The stored value exists but does not have the requested shape.
    #[error("value for key {key:?} has an unexpected type: {source}")]
    TypeMismatch {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be converted to or from its stored representation.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The function wrapped by a cache failed. Nothing was stored.
    #[error("cached computation {function} failed: {source}")]
    CacheComputationFailed {
        function: String,
        #[source]
        source: BoxError,
    },

    /// Two widgets rendered in the same run resolved to the same id.
    #[error("duplicate widget id {0}; pass an explicit key to disambiguate")]
    DuplicateWidgetId(String),

    /// An event referenced a widget that has no binding in the session.
    #[error("no widget with id {0} in this session")]
    UnknownWidget(String),

    /// An event changed a form member on its own. Its value is only
    /// committed when the form is submitted.
    #[error("widget {0} belongs to a form; submit the form to commit it")]
    DeferredWidget(String),

    /// A form submission named a widget that is not a submit button, or a
    /// value for a widget outside the submitted form.
    #[error("invalid form submission: {0}")]
    InvalidFormSubmission(String),

    /// The session manager has no session with this id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// A single event produced more consecutive reruns than allowed.
    #[error("rerun limit of {0} exceeded for a single event")]
    RerunLimitExceeded(usize),

    /// Control signal: halt the current run after the current statement.
    #[error("script stop requested")]
    StopRequested,

    /// Control signal: abandon the current run and start a new one.
    #[error("script rerun requested")]
    RerunRequested,

    /// Any other failure raised by page logic.
    #[error("{0}")]
    Script(String),
}

impl Error {
    /// Create a page-logic failure from any message.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }

    /// True for `StopRequested` and `RerunRequested`.
    pub fn is_control_signal(&self) -> bool {
        matches!(self, Self::StopRequested | Self::RerunRequested)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for rerun core operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Events that trigger a run.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::state::WidgetId;

/// What caused a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The user committed a new value for a widget.
    WidgetChanged { id: WidgetId, value: Value },

    /// A form was submitted: every member value is committed at once, in
    /// order, and the run is attributed to the submit button pressed.
    FormSubmitted {
        submitter: WidgetId,
        values: IndexMap<WidgetId, Value>,
    },

    /// Run again with the current state and no widget change.
    Rerun,
}

impl Event {
    /// A widget committed `value`.
    pub fn widget_changed<T: Serialize>(id: WidgetId, value: T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self::WidgetChanged { id, value })
    }

    /// A button was clicked.
    pub fn click(id: WidgetId) -> Self {
        Self::WidgetChanged {
            id,
            value: Value::Bool(true),
        }
    }

    /// Submit a form through `submitter` with the members' pending values.
    pub fn form_submitted(
        submitter: WidgetId,
        values: impl IntoIterator<Item = (WidgetId, Value)>,
    ) -> Self {
        Self::FormSubmitted {
            submitter,
            values: values.into_iter().collect(),
        }
    }

    /// The widget this event targets, if any.
    pub fn widget_id(&self) -> Option<&WidgetId> {
        match self {
            Self::WidgetChanged { id, .. } => Some(id),
            Self::FormSubmitted { submitter, .. } => Some(submitter),
            Self::Rerun => None,
        }
    }
}

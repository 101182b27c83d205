//! Widget identity and bindings.
//!
//! Every widget rendered by a script is bound to one slot in `SessionState`.
//! The slot's key is the widget's id: the explicit `key` passed by page
//! logic, or an implicit id derived from the widget's kind, label and
//! parameters. The binding's current value feeds the widget's next render
//! and receives the user's latest committed input.
//!
//! Bindings also carry the widget's optional callback, which the script
//! runner invokes when an event for this widget arrives, after the new value
//! is committed and before the script body runs.
//!
//! A binding made inside a form records the form's key. Such widgets never
//! cause a run on their own: their values arrive together when one of the
//! form's submit buttons is pressed.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use super::SessionState;
use crate::error::{Error, Result};

/// Prefix that marks content-derived widget ids.
const IMPLICIT_PREFIX: &str = "$$widget-";

/// Identifier of a widget, and the `SessionState` key it is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WidgetId(String);

impl WidgetId {
    /// Id from a key chosen by page logic.
    pub fn explicit(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Id derived from what the widget looks like.
    ///
    /// Two widgets with the same kind, label and parameters get the same id,
    /// so rendering both in one run is an error unless one has a key.
    pub fn implicit(kind: WidgetKind, label: &str, params: &Value) -> Self {
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        label.hash(&mut hasher);
        params.to_string().hash(&mut hasher);
        Self(format!("{IMPLICIT_PREFIX}{}-{:016x}", kind.as_str(), hasher.finish()))
    }

    /// True if this id was derived rather than chosen.
    pub fn is_implicit(&self) -> bool {
        self.0.starts_with(IMPLICIT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The input widgets the core knows how to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Button,
    Checkbox,
    Slider,
    TextInput,
    NumberInput,
    Selectbox,
    Radio,
    /// The button that submits the form it is rendered in.
    FormSubmit,
}

impl WidgetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Checkbox => "checkbox",
            Self::Slider => "slider",
            Self::TextInput => "text_input",
            Self::NumberInput => "number_input",
            Self::Selectbox => "selectbox",
            Self::Radio => "radio",
            Self::FormSubmit => "form_submit_button",
        }
    }

    /// Trigger widgets report `true` only in the run caused by their click.
    pub fn is_trigger(&self) -> bool {
        matches!(self, Self::Button | Self::FormSubmit)
    }
}

/// Arguments bound to a callback when it is registered.
pub type CallbackArgs = SmallVec<[Value; 2]>;

type CallbackFn = dyn Fn(&mut SessionState, &[Value]) -> Result<()> + Send + Sync;

/// A stored callback plus the arguments it was registered with.
#[derive(Clone)]
pub struct Callback {
    func: Arc<CallbackFn>,
    args: CallbackArgs,
}

impl Callback {
    /// Create a callback with no bound arguments.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut SessionState, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            args: CallbackArgs::new(),
        }
    }

    /// Bind arguments passed on every invocation.
    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Run the callback against `state`.
    pub fn invoke(&self, state: &mut SessionState) -> Result<()> {
        (self.func)(state, &self.args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Association between a rendered widget and its `SessionState` slot.
#[derive(Debug, Clone)]
pub struct WidgetBinding {
    pub id: WidgetId,
    pub kind: WidgetKind,
    pub label: String,
    pub callback: Option<Callback>,
    /// Key of the form this widget was rendered in.
    pub form: Option<String>,
}

impl WidgetBinding {
    /// The `SessionState` key holding this widget's value.
    pub fn state_key(&self) -> &str {
        self.id.as_str()
    }

    /// True for widgets whose input waits for a form submission.
    pub fn is_deferred(&self) -> bool {
        self.form.is_some() && self.kind != WidgetKind::FormSubmit
    }
}

/// Bindings known to one session.
///
/// Bindings survive between runs so an event can find its widget's callback.
/// Each run re-registers the widgets it renders; `finish_run` drops the ones
/// that were not rendered.
#[derive(Debug, Default)]
pub struct WidgetRegistry {
    bindings: HashMap<WidgetId, WidgetBinding>,
    seen_this_run: HashSet<WidgetId>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget which widgets the previous run rendered.
    pub fn begin_run(&mut self) {
        self.seen_this_run.clear();
    }

    /// Record a widget rendered in the current run.
    ///
    /// Fails if a widget with the same id was already rendered in this run.
    pub fn register(&mut self, binding: WidgetBinding) -> Result<()> {
        if !self.seen_this_run.insert(binding.id.clone()) {
            return Err(Error::DuplicateWidgetId(binding.id.to_string()));
        }
        self.bindings.insert(binding.id.clone(), binding);
        Ok(())
    }

    pub fn get(&self, id: &WidgetId) -> Option<&WidgetBinding> {
        self.bindings.get(id)
    }

    /// Ids of trigger widgets, whose values reset after each run.
    pub fn trigger_ids(&self) -> Vec<WidgetId> {
        self.bindings
            .values()
            .filter(|b| b.kind.is_trigger())
            .map(|b| b.id.clone())
            .collect()
    }

    /// Drop bindings for widgets the completed run did not render.
    ///
    /// Returns the dropped ids.
    pub fn finish_run(&mut self) -> Vec<WidgetId> {
        let stale: Vec<WidgetId> = self
            .bindings
            .keys()
            .filter(|id| !self.seen_this_run.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            self.bindings.remove(id);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding(id: WidgetId, kind: WidgetKind) -> WidgetBinding {
        WidgetBinding {
            id,
            kind,
            label: "label".into(),
            callback: None,
            form: None,
        }
    }

    #[test]
    fn implicit_ids_are_stable_and_content_derived() {
        let a = WidgetId::implicit(WidgetKind::Slider, "Volume", &json!([0, 10, 5]));
        let b = WidgetId::implicit(WidgetKind::Slider, "Volume", &json!([0, 10, 5]));
        let c = WidgetId::implicit(WidgetKind::Slider, "Volume", &json!([0, 11, 5]));
        let d = WidgetId::implicit(WidgetKind::NumberInput, "Volume", &json!([0, 10, 5]));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert!(a.is_implicit());
        assert!(!WidgetId::explicit("my_slider").is_implicit());
    }

    #[test]
    fn callback_receives_bound_args() {
        let cb = Callback::new(|state, args| {
            state.set("greeting", args[0].clone())?;
            Ok(())
        })
        .with_args([json!("Hello!")]);

        let mut state = SessionState::new();
        cb.invoke(&mut state).unwrap();
        assert_eq!(state.get_as::<String>("greeting").unwrap(), "Hello!");
        assert_eq!(cb.args(), &[json!("Hello!")]);
    }

    #[test]
    fn duplicate_registration_in_one_run_fails() {
        let mut registry = WidgetRegistry::new();
        registry.begin_run();
        let id = WidgetId::explicit("go");
        registry.register(binding(id.clone(), WidgetKind::Button)).unwrap();

        let err = registry
            .register(binding(id, WidgetKind::Button))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateWidgetId(_)));
    }

    #[test]
    fn same_widget_can_register_again_next_run() {
        let mut registry = WidgetRegistry::new();
        let id = WidgetId::explicit("go");

        registry.begin_run();
        registry.register(binding(id.clone(), WidgetKind::Button)).unwrap();
        registry.finish_run();

        registry.begin_run();
        registry.register(binding(id.clone(), WidgetKind::Button)).unwrap();
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn finish_run_drops_unrendered_widgets() {
        let mut registry = WidgetRegistry::new();
        let kept = WidgetId::explicit("kept");
        let gone = WidgetId::explicit("gone");

        registry.begin_run();
        registry.register(binding(kept.clone(), WidgetKind::Checkbox)).unwrap();
        registry.register(binding(gone.clone(), WidgetKind::Button)).unwrap();
        assert!(registry.finish_run().is_empty());
        assert_eq!(registry.trigger_ids(), vec![gone.clone()]);

        registry.begin_run();
        registry.register(binding(kept.clone(), WidgetKind::Checkbox)).unwrap();
        assert_eq!(registry.finish_run(), vec![gone.clone()]);

        assert!(registry.get(&kept).is_some());
        assert!(registry.get(&gone).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn form_members_are_deferred_but_submit_buttons_trigger() {
        let member = WidgetBinding {
            form: Some("login".into()),
            ..binding(WidgetId::explicit("user"), WidgetKind::TextInput)
        };
        let submit = WidgetBinding {
            form: Some("login".into()),
            ..binding(WidgetId::explicit("sign_in"), WidgetKind::FormSubmit)
        };

        assert!(member.is_deferred());
        assert!(!submit.is_deferred());
        assert!(!binding(WidgetId::explicit("free"), WidgetKind::TextInput).is_deferred());
        assert!(WidgetKind::FormSubmit.is_trigger());
    }
}

//! Script Context
//!
//! The `ScriptContext` is everything page logic can touch during one run:
//! the session's state, the app's caches, the render tree being built, and
//! the widget calls that bind inputs to state.
//!
//! # Display calls
//!
//! Every display call appends exactly one element to the render tree, in the
//! order the calls are made. Calls that validate their input (tables,
//! progress) fail instead of appending malformed data.
//!
//! # Widget calls
//!
//! A widget call:
//!
//! 1. resolves the widget's id (explicit key or content-derived),
//! 2. registers the binding, failing on a duplicate id in this run,
//! 3. seeds the bound state slot with the default if it is empty,
//! 4. reads the slot back, appends the widget element and returns the value.
//!
//! So a value written to a widget's key by page logic or a callback shows up
//! in the widget on the next run, and the user's committed input shows up in
//! state under the widget's key.
//!
//! # Forms
//!
//! Widgets rendered inside [`ScriptContext::form`] are deferred: editing
//! them does not cause a run. A form needs at least one
//! [`form_submit_button`](ScriptContext::form_submit_button); pressing it
//! commits every member's value in a single event, fires that button's
//! callback only, and then runs the script once. Members cannot carry
//! callbacks of their own, plain buttons are not allowed inside a form and
//! forms do not nest.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::trace;

use super::element::{AlertLevel, Element, RenderTree};
use crate::cache::CacheRegistry;
use crate::error::{Error, Result};
use crate::session::SessionId;
use crate::state::{Callback, SessionState, WidgetBinding, WidgetId, WidgetKind, WidgetRegistry};

/// Per-call options shared by every widget.
#[derive(Debug, Clone, Default)]
pub struct WidgetOptions {
    key: Option<String>,
    callback: Option<Callback>,
}

impl WidgetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the widget to this state key instead of a derived id.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Run `callback` when the user changes this widget.
    pub fn on_change(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Same as `on_change`; reads better for buttons.
    pub fn on_click(self, callback: Callback) -> Self {
        self.on_change(callback)
    }
}

/// Handle page logic uses during one run.
pub struct ScriptContext<'a> {
    session_id: SessionId,
    state: &'a mut SessionState,
    widgets: &'a mut WidgetRegistry,
    caches: &'a CacheRegistry,
    triggered_by: Option<WidgetId>,
    tree: RenderTree,
    form: Option<FormScope>,
    forms_seen: HashSet<String>,
}

/// The form currently being rendered.
#[derive(Debug)]
struct FormScope {
    key: String,
    has_submit: bool,
}

impl<'a> ScriptContext<'a> {
    pub(crate) fn new(
        session_id: SessionId,
        state: &'a mut SessionState,
        widgets: &'a mut WidgetRegistry,
        caches: &'a CacheRegistry,
        triggered_by: Option<WidgetId>,
    ) -> Self {
        Self {
            session_id,
            state,
            widgets,
            caches,
            triggered_by,
            tree: RenderTree::new(),
            form: None,
            forms_seen: HashSet::new(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut *self.state
    }

    /// The app's cache registry, for bulk clearing from page logic.
    pub fn caches(&self) -> &CacheRegistry {
        self.caches
    }

    /// The widget whose event caused this run, if any.
    pub fn triggered_by(&self) -> Option<&WidgetId> {
        self.triggered_by.as_ref()
    }

    /// The elements appended so far.
    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub(crate) fn into_tree(self) -> RenderTree {
        self.tree
    }

    // ------------------------------------------------------------------
    // Control signals
    // ------------------------------------------------------------------

    /// Halt this run. Use as `ctx.stop()?`; nothing after it executes.
    pub fn stop(&self) -> Result<()> {
        Err(Error::StopRequested)
    }

    /// Abandon this run and start a new one with the current state.
    pub fn rerun(&self) -> Result<()> {
        Err(Error::RerunRequested)
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// Append any element.
    pub fn push(&mut self, element: Element) {
        trace!(index = self.tree.len(), ?element, "append element");
        self.tree.push(element);
    }

    pub fn title(&mut self, body: impl Into<String>) {
        self.push(Element::Title { body: body.into() });
    }

    pub fn header(&mut self, body: impl Into<String>) {
        self.push(Element::Header { body: body.into() });
    }

    pub fn subheader(&mut self, body: impl Into<String>) {
        self.push(Element::Subheader { body: body.into() });
    }

    pub fn text(&mut self, body: impl Into<String>) {
        self.push(Element::Text { body: body.into() });
    }

    pub fn markdown(&mut self, body: impl Into<String>) {
        self.push(Element::Markdown { body: body.into() });
    }

    pub fn caption(&mut self, body: impl Into<String>) {
        self.push(Element::Caption { body: body.into() });
    }

    pub fn code(&mut self, body: impl Into<String>, language: Option<&str>) {
        self.push(Element::Code {
            body: body.into(),
            language: language.map(str::to_string),
        });
    }

    /// Show any value. Strings render as markdown, everything else as data.
    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        match value {
            Value::String(body) => self.push(Element::Markdown { body }),
            value => self.push(Element::Data { value }),
        }
        Ok(())
    }

    /// Show the whole session state.
    pub fn show_state(&mut self) {
        let value = self.state.to_json();
        self.push(Element::Data { value });
    }

    /// Show rows under `columns`. Every row must have one cell per column.
    pub fn table(&mut self, columns: &[&str], rows: Vec<Vec<Value>>) -> Result<()> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::script(format!(
                "malformed table: row {index} has {} cells, expected {}",
                row.len(),
                columns.len()
            )));
        }
        self.push(Element::Table {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
        Ok(())
    }

    pub fn image(&mut self, url: impl Into<String>, caption: Option<&str>) {
        self.push(Element::Image {
            url: url.into(),
            caption: caption.map(str::to_string),
        });
    }

    pub fn alert(&mut self, level: AlertLevel, body: impl Into<String>) {
        self.push(Element::Alert {
            level,
            body: body.into(),
        });
    }

    pub fn success(&mut self, body: impl Into<String>) {
        self.alert(AlertLevel::Success, body);
    }

    pub fn info(&mut self, body: impl Into<String>) {
        self.alert(AlertLevel::Info, body);
    }

    pub fn warning(&mut self, body: impl Into<String>) {
        self.alert(AlertLevel::Warning, body);
    }

    pub fn error(&mut self, body: impl Into<String>) {
        self.alert(AlertLevel::Error, body);
    }

    pub fn metric(&mut self, label: impl Into<String>, value: impl Into<String>, delta: Option<&str>) {
        self.push(Element::Metric {
            label: label.into(),
            value: value.into(),
            delta: delta.map(str::to_string),
        });
    }

    /// Show a progress bar at `value` percent.
    pub fn progress(&mut self, value: u8) -> Result<()> {
        if value > 100 {
            return Err(Error::script(format!("progress {value} is outside 0..=100")));
        }
        self.push(Element::Progress { value });
        Ok(())
    }

    pub fn divider(&mut self) {
        self.push(Element::Divider);
    }

    // ------------------------------------------------------------------
    // Widgets
    // ------------------------------------------------------------------

    /// A button. True only in the run caused by clicking it.
    pub fn button(&mut self, label: &str, options: WidgetOptions) -> Result<bool> {
        if let Some(form) = &self.form {
            return Err(Error::script(format!(
                "button {label:?} inside form {:?}; use form_submit_button",
                form.key
            )));
        }
        let (id, pressed) = self.bind(WidgetKind::Button, label, json!({}), false, options)?;
        self.emit_widget(id, WidgetKind::Button, label, &pressed)?;
        Ok(pressed)
    }

    pub fn checkbox(&mut self, label: &str, default: bool, options: WidgetOptions) -> Result<bool> {
        let params = json!({ "default": default });
        let (id, checked) = self.bind(WidgetKind::Checkbox, label, params, default, options)?;
        self.emit_widget(id, WidgetKind::Checkbox, label, &checked)?;
        Ok(checked)
    }

    /// An integer slider. Stored values outside `min..=max` are clamped.
    pub fn slider(
        &mut self,
        label: &str,
        min: i64,
        max: i64,
        default: i64,
        options: WidgetOptions,
    ) -> Result<i64> {
        if min > max || !(min..=max).contains(&default) {
            return Err(Error::script(format!(
                "slider {label:?}: default {default} is outside {min}..={max}"
            )));
        }
        let params = json!({ "min": min, "max": max, "default": default });
        let (id, value) = self.bind(WidgetKind::Slider, label, params, default, options)?;
        let clamped = value.clamp(min, max);
        if clamped != value {
            self.state.set(id.as_str(), clamped)?;
        }
        self.emit_widget(id, WidgetKind::Slider, label, &clamped)?;
        Ok(clamped)
    }

    pub fn text_input(&mut self, label: &str, default: &str, options: WidgetOptions) -> Result<String> {
        let params = json!({ "default": default });
        let (id, text) =
            self.bind(WidgetKind::TextInput, label, params, default.to_string(), options)?;
        self.emit_widget(id, WidgetKind::TextInput, label, &text)?;
        Ok(text)
    }

    /// A numeric input. Stored values outside `min..=max` are clamped.
    pub fn number_input(
        &mut self,
        label: &str,
        min: f64,
        max: f64,
        default: f64,
        options: WidgetOptions,
    ) -> Result<f64> {
        if !(min <= default && default <= max) {
            return Err(Error::script(format!(
                "number input {label:?}: default {default} is outside {min}..={max}"
            )));
        }
        let params = json!({ "min": min, "max": max, "default": default });
        let (id, value) = self.bind(WidgetKind::NumberInput, label, params, default, options)?;
        let clamped = value.clamp(min, max);
        if clamped != value {
            self.state.set(id.as_str(), clamped)?;
        }
        self.emit_widget(id, WidgetKind::NumberInput, label, &clamped)?;
        Ok(clamped)
    }

    /// A dropdown. Returns the selected option.
    pub fn selectbox(
        &mut self,
        label: &str,
        choices: &[&str],
        index: usize,
        options: WidgetOptions,
    ) -> Result<String> {
        self.choice(WidgetKind::Selectbox, label, choices, index, options)
    }

    /// A radio group. Returns the selected option.
    pub fn radio(
        &mut self,
        label: &str,
        choices: &[&str],
        index: usize,
        options: WidgetOptions,
    ) -> Result<String> {
        self.choice(WidgetKind::Radio, label, choices, index, options)
    }

    fn choice(
        &mut self,
        kind: WidgetKind,
        label: &str,
        choices: &[&str],
        index: usize,
        options: WidgetOptions,
    ) -> Result<String> {
        let Some(default) = choices.get(index) else {
            return Err(Error::script(format!(
                "{} {label:?}: index {index} out of range for {} options",
                kind.as_str(),
                choices.len()
            )));
        };
        let params = json!({ "options": choices, "index": index });
        let (id, selected) = self.bind(kind, label, params, default.to_string(), options)?;

        // A stale selection (options changed) falls back to the default.
        let selected = if choices.contains(&selected.as_str()) {
            selected
        } else {
            self.state.set(id.as_str(), *default)?;
            default.to_string()
        };
        self.emit_widget(id, kind, label, &selected)?;
        Ok(selected)
    }

    // ------------------------------------------------------------------
    // Forms
    // ------------------------------------------------------------------

    /// Render the widgets `body` creates as one form under `key`.
    ///
    /// Fails if `key` was already used in this run, if called inside another
    /// form, or if `body` renders no submit button.
    pub fn form<F>(&mut self, key: &str, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if let Some(outer) = &self.form {
            return Err(Error::script(format!(
                "form {key:?} nested inside form {:?}",
                outer.key
            )));
        }
        if !self.forms_seen.insert(key.to_string()) {
            return Err(Error::script(format!("duplicate form key {key:?}")));
        }

        self.push(Element::FormStart {
            key: key.to_string(),
        });
        self.form = Some(FormScope {
            key: key.to_string(),
            has_submit: false,
        });
        let result = body(self);
        let scope = self.form.take();
        result?;

        if !scope.is_some_and(|scope| scope.has_submit) {
            return Err(Error::script(format!("form {key:?} has no submit button")));
        }
        self.push(Element::FormEnd {
            key: key.to_string(),
        });
        Ok(())
    }

    /// The key of the form being rendered, if any.
    pub fn current_form(&self) -> Option<&str> {
        self.form.as_ref().map(|scope| scope.key.as_str())
    }

    /// A form's submit button. True only in the run caused by submitting
    /// the form through this button.
    pub fn form_submit_button(&mut self, label: &str, options: WidgetOptions) -> Result<bool> {
        let Some(scope) = self.form.as_mut() else {
            return Err(Error::script(format!(
                "form_submit_button {label:?} outside of a form"
            )));
        };
        scope.has_submit = true;

        let (id, pressed) = self.bind(WidgetKind::FormSubmit, label, json!({}), false, options)?;
        self.emit_widget(id, WidgetKind::FormSubmit, label, &pressed)?;
        Ok(pressed)
    }

    fn bind<T>(
        &mut self,
        kind: WidgetKind,
        label: &str,
        params: Value,
        default: T,
        options: WidgetOptions,
    ) -> Result<(WidgetId, T)>
    where
        T: Serialize + DeserializeOwned,
    {
        let form = self.form.as_ref().map(|scope| scope.key.clone());
        if form.is_some() && kind != WidgetKind::FormSubmit && options.callback.is_some() {
            return Err(Error::script(format!(
                "{} {label:?} is in a form; only its submit button may have a callback",
                kind.as_str()
            )));
        }

        // The same widget in two forms gets two ids.
        let id = match (options.key, &form) {
            (Some(key), _) => WidgetId::explicit(key),
            (None, Some(form)) => {
                WidgetId::implicit(kind, label, &json!({ "form": form, "params": params }))
            }
            (None, None) => WidgetId::implicit(kind, label, &params),
        };
        self.widgets.register(WidgetBinding {
            id: id.clone(),
            kind,
            label: label.to_string(),
            callback: options.callback,
            form,
        })?;

        if !self.state.has(id.as_str()) {
            self.state.set(id.as_str(), &default)?;
        }
        let value = self.state.get_as(id.as_str())?;
        Ok((id, value))
    }

    fn emit_widget<T: Serialize>(
        &mut self,
        id: WidgetId,
        kind: WidgetKind,
        label: &str,
        value: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.push(Element::Widget {
            id,
            kind,
            label: label.to_string(),
            value,
        });
        Ok(())
    }
}

//! Display elements and the render tree.
//!
//! The render tree is what one run hands to the display surface: a flat,
//! ordered list of typed elements. Order is the order statements executed
//! in. Nothing is ever reordered or replaced after being appended.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::state::{WidgetId, WidgetKind};

/// Severity of an alert box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// One display element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Title {
        body: String,
    },
    Header {
        body: String,
    },
    Subheader {
        body: String,
    },
    Text {
        body: String,
    },
    Markdown {
        body: String,
    },
    Caption {
        body: String,
    },
    Code {
        body: String,
        language: Option<String>,
    },
    /// Arbitrary structured data, shown the way the surface sees fit.
    Data {
        value: Value,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// An image already resolved to a URL or data URI.
    Image {
        url: String,
        caption: Option<String>,
    },
    Alert {
        level: AlertLevel,
        body: String,
    },
    Metric {
        label: String,
        value: String,
        delta: Option<String>,
    },
    /// Percent complete, 0 to 100.
    Progress {
        value: u8,
    },
    Divider,
    /// Opens a form. Elements up to the matching `FormEnd` belong to it.
    FormStart {
        key: String,
    },
    FormEnd {
        key: String,
    },
    /// An input widget with the value it renders with.
    Widget {
        id: WidgetId,
        kind: WidgetKind,
        label: String,
        value: Value,
    },
    /// The failure that ended the run.
    Exception {
        message: String,
    },
}

/// Ordered output of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderTree {
    elements: Vec<Element>,
}

impl RenderTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element after everything already in the tree.
    pub fn push(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn last(&self) -> Option<&Element> {
        self.elements.last()
    }

    /// Encode the tree as MessagePack for the display surface.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decode a tree produced by `encode`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }
}

impl<'a> IntoIterator for &'a RenderTree {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

//! Per-kind writers.
//!
//! A writer is a pure function from a component and its owning page to the
//! parts it contributes. [`WriterTable`] maps component kinds to writers;
//! kinds without an entry contribute nothing.

use std::collections::HashMap;

use crate::component::{Component, PAGE_KIND, Page};
use crate::parts::ComponentParts;

/// Writer signature.
pub type Writer = fn(&Component, &Page) -> Option<ComponentParts>;

/// Kinds whose only compiled output is their callbacks.
const CALLBACK_KINDS: &[&str] = &[
    "button", "input", "textbox", "select", "checkbox", "switch", "chart", "grid", "table", "counter",
    "monitor", "dynamic", "row", "column", "card", "layout",
];

/// Kind of raw client elements that may carry a script.
pub const ELEMENT_KIND: &str = "element";

/// Emits one endpoint per callback.
pub fn write_callbacks(component: &Component, _page: &Page) -> Option<ComponentParts> {
    component
        .has_callbacks()
        .then(|| ComponentParts::from_endpoints(component.endpoints()))
}

/// Emits callbacks plus the element's client-side script.
pub fn write_element(component: &Component, page: &Page) -> Option<ComponentParts> {
    let mut parts = write_callbacks(component, page).unwrap_or_default();
    if let Some(script) = component.element_script() {
        let _ = parts
            .element_scripts
            .insert(component.id().clone(), script.to_owned());
    }
    (!parts.is_empty()).then_some(parts)
}

/// Emits the page's own callbacks (dynamic page content).
pub fn write_page(component: &Component, page: &Page) -> Option<ComponentParts> {
    write_callbacks(component, page)
}

/// Kind → writer dispatch table.
#[derive(Clone, Debug)]
pub struct WriterTable {
    writers: HashMap<String, Writer>,
}

impl WriterTable {
    /// Table with no writers.
    pub fn empty() -> Self {
        Self {
            writers: HashMap::new(),
        }
    }

    /// Table with the built-in kinds.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for kind in CALLBACK_KINDS {
            table.register(*kind, write_callbacks);
        }
        table.register(ELEMENT_KIND, write_element);
        table.register(PAGE_KIND, write_page);
        table
    }

    /// Add or replace the writer for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, writer: Writer) {
        let _ = self.writers.insert(kind.into(), writer);
    }

    /// Writer for `kind`.
    pub fn get(&self, kind: &str) -> Option<Writer> {
        self.writers.get(kind).copied()
    }

    /// Run the writer matching the component's kind.
    pub fn write(&self, component: &Component, page: &Page) -> Option<ComponentParts> {
        let Some(writer) = self.get(component.kind()) else {
            tracing::trace!(kind = component.kind(), id = %component.id(), "no writer for component kind");
            return None;
        };
        writer(component, page)
    }
}

impl Default for WriterTable {
    fn default() -> Self {
        Self::builtin()
    }
}

//! Declarative component tree.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashhub_core::{ComponentId, Endpoint, EndpointHandler, EndpointId};
use serde_json::{Map, Value};

/// Kind tag of the implicit page root.
pub const PAGE_KIND: &str = "page";

/// A node in the dashboard tree.
///
/// The ID is assigned when the component is built and never changes, so
/// compiling the same tree twice yields the same endpoint IDs.
#[derive(Clone)]
pub struct Component {
    id: ComponentId,
    kind: String,
    properties: Map<String, Value>,
    callbacks: BTreeMap<String, Arc<dyn EndpointHandler>>,
    script: Option<String>,
    children: Vec<Component>,
}

impl Component {
    /// New component of `kind` with a generated ID.
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_id(kind, ComponentId::new())
    }

    /// New component with a caller-chosen ID.
    pub fn with_id(kind: impl Into<String>, id: impl Into<ComponentId>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            properties: Map::new(),
            callbacks: BTreeMap::new(),
            script: None,
            children: Vec::new(),
        }
    }

    /// Set a rendering property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.properties.insert(key.into(), value);
        self
    }

    /// Primary callback, addressed by the component ID itself.
    #[must_use]
    pub fn on_event(self, handler: Arc<dyn EndpointHandler>) -> Self {
        self.on("", handler)
    }

    /// Named callback, addressed as `<component id><event>`.
    #[must_use]
    pub fn on(mut self, event: impl Into<String>, handler: Arc<dyn EndpointHandler>) -> Self {
        let _ = self.callbacks.insert(event.into(), handler);
        self
    }

    /// Client-side element script.
    #[must_use]
    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Append a child.
    #[must_use]
    pub fn child(mut self, child: Component) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children.
    #[must_use]
    pub fn children_from<I: IntoIterator<Item = Component>>(mut self, children: I) -> Self {
        self.children.extend(children);
        self
    }

    /// Stable instance ID.
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// Variant tag used to select a writer.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Rendering properties.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Element script, if any.
    pub fn element_script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// Direct children.
    pub fn children(&self) -> &[Component] {
        &self.children
    }

    /// Whether any callback is attached.
    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    /// Endpoint ID for the callback bound to `event`.
    pub fn endpoint_id(&self, event: &str) -> EndpointId {
        EndpointId::from_raw(format!("{}{event}", self.id))
    }

    /// One global endpoint per callback, in event-name order.
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.callbacks
            .iter()
            .map(|(event, handler)| Arc::new(Endpoint::new(self.endpoint_id(event), Arc::clone(handler))))
            .collect()
    }

    /// Depth-first, pre-order visit of this component and its descendants.
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Component),
    {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .field("script", &self.script)
            .field("children", &self.children)
            .finish()
    }
}

/// A page: a named root component.
#[derive(Clone, Debug)]
pub struct Page {
    name: String,
    url: Option<String>,
    root: Component,
}

impl Page {
    /// Empty page.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            root: Component::new(PAGE_KIND).property("name", Value::String(name.clone())),
            name,
            url: None,
        }
    }

    /// Route the page is served at.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add a top-level component.
    #[must_use]
    pub fn component(mut self, component: Component) -> Self {
        self.root = self.root.child(component);
        self
    }

    /// Callback on the page itself, such as a dynamic content loader.
    #[must_use]
    pub fn on_load(mut self, handler: Arc<dyn EndpointHandler>) -> Self {
        self.root = self.root.on_event(handler);
        self
    }

    /// Page name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Page route, if set.
    pub fn route(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The page's own component.
    pub fn root(&self) -> &Component {
        &self.root
    }

    /// Top-level components.
    pub fn components(&self) -> &[Component] {
        self.root.children()
    }
}

/// Site navigation with its own endpoints.
#[derive(Clone, Debug, Default)]
pub struct Navigation {
    /// Endpoint producing dynamic navigation content.
    pub callback: Option<Arc<Endpoint>>,
    /// Extra endpoints used by navigation items, added verbatim.
    pub child_endpoints: Vec<Arc<Endpoint>>,
}

/// A complete dashboard definition.
#[derive(Clone, Debug)]
pub struct Dashboard {
    /// Title shown by the client.
    pub title: String,
    /// Pages in display order.
    pub pages: Vec<Page>,
    /// Optional navigation.
    pub navigation: Option<Navigation>,
}

impl Dashboard {
    /// Dashboard with no pages.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: Vec::new(),
            navigation: None,
        }
    }

    /// Append a page.
    #[must_use]
    pub fn page(mut self, page: Page) -> Self {
        self.pages.push(page);
        self
    }

    /// Set the navigation.
    #[must_use]
    pub fn navigation(mut self, navigation: Navigation) -> Self {
        self.navigation = Some(navigation);
        self
    }
}

//! Tree flattening into a [`DashboardApp`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashhub_core::{ComponentId, Endpoint, EndpointId, EndpointRegistry};
use tracing::{debug, warn};

use crate::component::{Component, Dashboard, Page};
use crate::parts::ComponentParts;
use crate::writers::WriterTable;

/// Compiled dashboard: everything the hub needs to serve it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardApp {
    /// Endpoints to register.
    pub endpoints: Vec<Arc<Endpoint>>,
    /// Client-side element scripts by component instance.
    pub element_scripts: BTreeMap<ComponentId, String>,
    /// IDs emitted more than once. Only the first endpoint with each ID is
    /// kept in [`endpoints`](Self::endpoints).
    pub duplicate_endpoints: Vec<EndpointId>,
}

impl DashboardApp {
    /// Register every endpoint in `registry`. Returns how many were added.
    pub fn register(&self, registry: &EndpointRegistry) -> usize {
        registry.register_all(self.endpoints.iter().cloned())
    }

    /// Endpoint IDs in emission order.
    pub fn endpoint_ids(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.id().as_str()).collect()
    }
}

impl From<ComponentParts> for DashboardApp {
    fn from(parts: ComponentParts) -> Self {
        let mut seen = HashSet::with_capacity(parts.endpoints.len());
        let mut endpoints = Vec::with_capacity(parts.endpoints.len());
        let mut duplicate_endpoints = Vec::new();
        for endpoint in parts.endpoints {
            if seen.insert(endpoint.id().clone()) {
                endpoints.push(endpoint);
            } else {
                warn!(endpoint = %endpoint.id(), "duplicate endpoint id, keeping the first");
                duplicate_endpoints.push(endpoint.id().clone());
            }
        }
        Self {
            endpoints,
            element_scripts: parts.element_scripts,
            duplicate_endpoints,
        }
    }
}

/// Walks component trees and merges what each writer produces.
#[derive(Clone, Debug, Default)]
pub struct Compiler {
    writers: WriterTable,
}

impl Compiler {
    /// Compiler with the built-in writers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler with a custom writer table.
    pub fn with_writers(writers: WriterTable) -> Self {
        Self { writers }
    }

    /// Compile a whole dashboard: every page's components, each page
    /// itself, then the navigation endpoints.
    pub fn compile(&self, dashboard: &Dashboard) -> DashboardApp {
        let mut parts = ComponentParts::new();
        for page in &dashboard.pages {
            parts.combine(self.write_tree(page.components(), page));
            if let Some(own) = self.writers.write(page.root(), page) {
                parts.combine(own);
            }
        }

        for endpoint in &parts.endpoints {
            debug!(endpoint = %endpoint.id(), "adding endpoint");
        }

        if let Some(navigation) = &dashboard.navigation {
            if let Some(callback) = &navigation.callback {
                parts.endpoints.push(Arc::clone(callback));
            }
            parts.endpoints.extend(navigation.child_endpoints.iter().cloned());
        }

        debug!(
            title = %dashboard.title,
            pages = dashboard.pages.len(),
            endpoints = parts.endpoints.len(),
            scripts = parts.element_scripts.len(),
            "dashboard compiled"
        );
        parts.into()
    }

    /// Compile a list of components against `page`, without the page's own
    /// parts or any navigation. Used for regions rendered at runtime.
    pub fn compile_components(&self, components: &[Component], page: &Page) -> DashboardApp {
        let parts = self.write_tree(components, page);
        for endpoint in &parts.endpoints {
            debug!(endpoint = %endpoint.id(), page = page.name(), "adding endpoint");
        }
        parts.into()
    }

    fn write_tree(&self, components: &[Component], page: &Page) -> ComponentParts {
        let mut parts = ComponentParts::new();
        for component in components {
            component.walk(&mut |c| {
                if let Some(p) = self.writers.write(c, page) {
                    parts.combine(p);
                }
            });
        }
        parts
    }
}

/// Compile with the built-in writers.
pub fn compile(dashboard: &Dashboard) -> DashboardApp {
    Compiler::new().compile(dashboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Navigation;
    use crate::writers::ELEMENT_KIND;
    use dashhub_core::{EndpointHandler, EndpointLookup, ExecutionContext, handler_fn};

    fn noop() -> Arc<dyn EndpointHandler> {
        handler_fn(|_ctx: &ExecutionContext| async { Ok(()) })
    }

    fn sample() -> Dashboard {
        let home = Page::new("Home")
            .component(
                Component::with_id("row", "row1")
                    .child(Component::with_id("button", "btn1").on_event(noop()))
                    .child(
                        Component::with_id("column", "col1")
                            .child(Component::with_id("chart", "chart1").on("onClick", noop())),
                    ),
            )
            .component(Component::with_id(ELEMENT_KIND, "el1").script("init()"));
        let about = Page::new("About").on_load(noop());

        let nav_callback = Arc::new(Endpoint::new("nav", noop()));
        let nav_child = Arc::new(Endpoint::new("nav-item-1", noop()));

        Dashboard::new("Ops").page(home).page(about).navigation(Navigation {
            callback: Some(nav_callback),
            child_endpoints: vec![nav_child],
        })
    }

    #[test]
    fn compiles_nested_components_page_and_navigation() {
        let dashboard = sample();
        let about_root = dashboard.pages[1].root().id().to_string();
        let app = compile(&dashboard);

        assert_eq!(
            app.endpoint_ids(),
            ["btn1", "chart1onClick", about_root.as_str(), "nav", "nav-item-1"]
        );
        assert_eq!(app.element_scripts.get("el1").map(String::as_str), Some("init()"));
    }

    #[test]
    fn compiling_twice_yields_equal_endpoints() {
        let dashboard = sample();
        let first = compile(&dashboard);
        let second = compile(&dashboard);
        assert_eq!(first, second);
        assert_eq!(first.endpoint_ids(), second.endpoint_ids());
    }

    #[test]
    fn unknown_kinds_do_not_fail_compile() {
        let page = Page::new("P").component(
            Component::with_id("mystery", "m1")
                .on_event(noop())
                .child(Component::with_id("button", "inner").on_event(noop())),
        );
        let app = compile(&Dashboard::new("D").page(page));
        assert_eq!(app.endpoint_ids(), ["inner"]);
    }

    #[test]
    fn navigation_without_callback_adds_children_only() {
        let dashboard = Dashboard::new("D").navigation(Navigation {
            callback: None,
            child_endpoints: vec![Arc::new(Endpoint::new("child", noop()))],
        });
        assert_eq!(compile(&dashboard).endpoint_ids(), ["child"]);
    }

    #[test]
    fn compile_components_skips_page_and_navigation() {
        let page = Page::new("Live").on_load(noop());
        let components = [
            Component::with_id("button", "refresh").on_event(noop()),
            Component::with_id(ELEMENT_KIND, "tile").script("tile()"),
        ];
        let app = Compiler::new().compile_components(&components, &page);
        assert_eq!(app.endpoint_ids(), ["refresh"]);
        assert_eq!(app.element_scripts.len(), 1);
    }

    #[test]
    fn colliding_endpoint_ids_keep_first() {
        let page = Page::new("P")
            .component(Component::with_id("button", "a").on("bc", noop()))
            .component(Component::with_id("button", "ab").on("c", noop()));
        let app = compile(&Dashboard::new("D").page(page));

        assert_eq!(app.endpoint_ids(), ["abc"]);
        assert_eq!(app.duplicate_endpoints, [EndpointId::from("abc")]);

        let registry = EndpointRegistry::new();
        assert_eq!(app.register(&registry), 1);
    }

    #[test]
    fn distinct_ids_report_no_duplicates() {
        assert!(compile(&sample()).duplicate_endpoints.is_empty());
    }

    #[test]
    fn register_fills_registry() {
        let app = compile(&sample());
        let registry = EndpointRegistry::new();
        assert_eq!(app.register(&registry), 5);
        assert!(registry.get("btn1", None).is_some());
        assert!(registry.get("nav", None).is_some());
    }
}

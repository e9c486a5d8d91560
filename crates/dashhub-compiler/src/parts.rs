//! Compiled output accumulator.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashhub_core::{ComponentId, Endpoint};

/// Endpoints and element scripts produced by one or more components.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentParts {
    /// Endpoints in emission order.
    pub endpoints: Vec<Arc<Endpoint>>,
    /// Client-side element scripts by component instance.
    pub element_scripts: BTreeMap<ComponentId, String>,
}

impl ComponentParts {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parts carrying only endpoints.
    pub fn from_endpoints(endpoints: Vec<Arc<Endpoint>>) -> Self {
        Self {
            endpoints,
            element_scripts: BTreeMap::new(),
        }
    }

    /// Additive merge: endpoints are appended, scripts are unioned by
    /// component ID with `other` winning on a shared key.
    pub fn combine(&mut self, other: ComponentParts) {
        self.endpoints.extend(other.endpoints);
        self.element_scripts.extend(other.element_scripts);
    }

    /// Whether nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty() && self.element_scripts.is_empty()
    }
}

impl FromIterator<ComponentParts> for ComponentParts {
    fn from_iter<I: IntoIterator<Item = ComponentParts>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |mut acc, part| {
            acc.combine(part);
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashhub_core::{ExecutionContext, handler_fn};

    fn endpoint(id: &str) -> Arc<Endpoint> {
        Arc::new(Endpoint::new(id, handler_fn(|_ctx: &ExecutionContext| async { Ok(()) })))
    }

    fn scripts(entries: &[(&str, &str)]) -> BTreeMap<ComponentId, String> {
        entries
            .iter()
            .map(|(k, v)| (ComponentId::from(*k), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn combine_appends_endpoints_in_order() {
        let mut a = ComponentParts::from_endpoints(vec![endpoint("a")]);
        a.combine(ComponentParts::from_endpoints(vec![endpoint("b"), endpoint("c")]));
        let ids: Vec<&str> = a.endpoints.iter().map(|e| e.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn combine_keeps_sibling_scripts() {
        // two elements rendered under the same parent keep their own scripts
        let mut a = ComponentParts {
            endpoints: Vec::new(),
            element_scripts: scripts(&[("list-item-1", "init(1)")]),
        };
        let b = ComponentParts {
            endpoints: Vec::new(),
            element_scripts: scripts(&[("list-item-2", "init(2)")]),
        };
        a.combine(b);
        assert_eq!(a.element_scripts, scripts(&[("list-item-1", "init(1)"), ("list-item-2", "init(2)")]));
    }

    #[test]
    fn collect_merges_all() {
        let merged: ComponentParts = vec![
            ComponentParts::from_endpoints(vec![endpoint("x")]),
            ComponentParts::new(),
            ComponentParts {
                endpoints: Vec::new(),
                element_scripts: scripts(&[("e", "s")]),
            },
        ]
        .into_iter()
        .collect();
        assert_eq!(merged.endpoints.len(), 1);
        assert_eq!(merged.element_scripts.len(), 1);
        assert!(!merged.is_empty());
        assert!(ComponentParts::new().is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap as Map;

        fn parts_from(map: &Map<String, String>) -> ComponentParts {
            ComponentParts {
                endpoints: Vec::new(),
                element_scripts: map
                    .iter()
                    .map(|(k, v)| (ComponentId::from(k.as_str()), v.clone()))
                    .collect(),
            }
        }

        proptest! {
            #[test]
            fn combine_is_a_key_union(
                left in prop::collection::btree_map("[a-f]{1,3}", "[a-z]{0,8}", 0..16),
                right in prop::collection::btree_map("[a-f]{1,3}", "[a-z]{0,8}", 0..16),
            ) {
                let mut merged = parts_from(&left);
                merged.combine(parts_from(&right));

                for key in left.keys().chain(right.keys()) {
                    prop_assert!(merged.element_scripts.contains_key(key.as_str()));
                }
                for (key, value) in &right {
                    prop_assert_eq!(&merged.element_scripts[key.as_str()], value);
                }
                let union: std::collections::BTreeSet<_> = left.keys().chain(right.keys()).collect();
                prop_assert_eq!(merged.element_scripts.len(), union.len());
            }
        }
    }
}

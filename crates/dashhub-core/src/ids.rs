//! Branded ID newtypes.
//!
//! Connections, sessions, pending state requests, components and endpoints
//! each get their own newtype so one cannot be passed where another is
//! expected. Generated IDs are UUID v7 (time-ordered) with a short prefix.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh ID (`<prefix>_<uuid v7>`).
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an existing string value.
            #[must_use]
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Transport-assigned identifier for one physical client attachment.
    ConnectionId,
    "conn"
);
branded_id!(
    /// Logical client identity chosen by the client application.
    SessionId,
    "sess"
);
branded_id!(
    /// Correlation ID for an outstanding `requestState` command.
    RequestId,
    "req"
);
branded_id!(
    /// Stable identifier of a component instance in the UI tree.
    ComponentId,
    "cmp"
);
branded_id!(
    /// Identifier (URL) of a server-side endpoint.
    EndpointId,
    "ep"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_prefix() {
        assert!(ConnectionId::new().starts_with("conn_"));
        assert!(SessionId::new().starts_with("sess_"));
        assert!(RequestId::new().starts_with("req_"));
        assert!(ComponentId::new().starts_with("cmp_"));
        assert!(EndpointId::new().starts_with("ep_"));
    }

    #[test]
    fn ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_raw_preserves_value() {
        let id = SessionId::from_raw("browser-tab-7");
        assert_eq!(id.as_str(), "browser-tab-7");
        assert_eq!(id.to_string(), "browser-tab-7");
    }

    #[test]
    fn serializes_transparently() {
        let id = ComponentId::from_raw("btn1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"btn1\"");
        let back: ComponentId = serde_json::from_str("\"btn1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn borrow_allows_str_lookup() {
        let mut map = std::collections::HashMap::new();
        let _ = map.insert(EndpointId::from("grid1"), 1);
        assert_eq!(map.get("grid1"), Some(&1));
    }

    #[test]
    fn generated_ids_are_time_ordered() {
        let ids: Vec<RequestId> = (0..50).map(|_| RequestId::new()).collect();
        for w in ids.windows(2) {
            assert!(w[0] < w[1], "not monotonic: {} >= {}", w[0], w[1]);
        }
    }
}

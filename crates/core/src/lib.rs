//! Trellis core types: record identity and raw-record field access.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod restrict;

/// Identity of a cluster record, stable across refreshes of the live
/// collection. Cluster-scoped records carry an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// Read the identity out of a raw record. Missing metadata degrades to
    /// empty components rather than failing.
    pub fn of(raw: &Value) -> Self {
        Self {
            namespace: raw
                .pointer("/metadata/namespace")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            name: raw
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Walk a dotted path (e.g. `spec.provider.type`) over a raw record.
/// Numeric segments index into arrays. Returns None as soon as a segment
/// does not resolve.
pub fn resolve_path<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = raw;
    for seg in path.split('.') {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub mod prelude {
    pub use super::restrict::{
        map_access_restriction_for_input, AccessRestrictionDef, InputConfig, OptionDef,
        OptionValue, RestrictionValue,
    };
    pub use super::{resolve_path, ResourceId};
}

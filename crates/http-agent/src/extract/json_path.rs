//! Dot-and-index path lookup over parsed JSON.

use serde_json::Value;

/// Walk `selector` (`a.b.0.c`) through `root`.
///
/// Mapping segments are key lookups, sequence segments are non-negative
/// indices. Any miss stops the walk and yields `None`; so does a JSON `null`
/// at the end of the path.
pub fn select(root: &Value, selector: &str) -> Option<Value> {
    let mut current = root;
    for segment in selector.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        Value::Null => None,
        found => Some(found.clone()),
    }
}

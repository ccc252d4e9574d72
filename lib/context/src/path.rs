//! Dot-notation path resolution.

use serde_json::{Map, Value as JsonValue};

/// Resolves a dot-separated path such as `custom_attributes.category`.
///
/// Object segments are looked up by key; a purely numeric segment indexes
/// into an array. Returns `None` for an empty path, an empty segment or any
/// segment that does not resolve.
#[must_use]
pub fn resolve_path<'a>(root: &'a Map<String, JsonValue>, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let first = segments.next().filter(|s| !s.is_empty())?;
    let mut current = root.get(first)?;

    for segment in segments {
        if segment.is_empty() {
            return None;
        }
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact() -> Map<String, JsonValue> {
        json!({
            "name": "Dana",
            "custom_attributes": { "category": "vip", "tags": ["a", "b"] },
            "additional_attributes": { "city": "Haifa" }
        })
        .as_object()
        .cloned()
        .expect("object")
    }

    #[test]
    fn resolves_top_level_key() {
        assert_eq!(resolve_path(&contact(), "name"), Some(&json!("Dana")));
    }

    #[test]
    fn resolves_nested_attributes() {
        let c = contact();
        assert_eq!(
            resolve_path(&c, "custom_attributes.category"),
            Some(&json!("vip"))
        );
        assert_eq!(
            resolve_path(&c, "additional_attributes.city"),
            Some(&json!("Haifa"))
        );
    }

    #[test]
    fn indexes_into_arrays() {
        assert_eq!(
            resolve_path(&contact(), "custom_attributes.tags.1"),
            Some(&json!("b"))
        );
        assert_eq!(resolve_path(&contact(), "custom_attributes.tags.9"), None);
        assert_eq!(resolve_path(&contact(), "custom_attributes.tags.x"), None);
    }

    #[test]
    fn missing_or_malformed_paths_resolve_to_none() {
        let c = contact();
        assert_eq!(resolve_path(&c, "unknown"), None);
        assert_eq!(resolve_path(&c, "name.first"), None);
        assert_eq!(resolve_path(&c, ""), None);
        assert_eq!(resolve_path(&c, "custom_attributes..category"), None);
    }
}

//! Path operations on an in-memory JSON tree.
//!
//! Semantics match a hierarchical keyed store: setting below a scalar
//! replaces the scalar with an object, arrays behave like objects keyed by
//! index, and deleting a missing node is a no-op.

use serde_json::{Map, Value};

use crate::path::Path;

/// Read the node at `path`, if present.
pub fn get_at<'a>(tree: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut node = tree;
    for segment in path.segments() {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Write `value` at `path`, creating intermediate objects as needed.
/// A `null` value deletes the node.
pub fn set_at(tree: &mut Value, path: &Path, value: Value) {
    if value.is_null() {
        delete_at(tree, path);
        return;
    }
    let Some((last, parents)) = path.segments().split_last() else {
        *tree = value;
        return;
    };

    let mut node = tree;
    for segment in parents {
        let Some(next) = child_mut(node, segment) else {
            return;
        };
        node = next;
    }
    if let Some(map) = as_object(node) {
        map.insert(last.clone(), value);
    }
}

/// Remove the node at `path`. Returns whether anything was removed.
pub fn delete_at(tree: &mut Value, path: &Path) -> bool {
    let Some((last, parents)) = path.segments().split_last() else {
        let existed = !tree.is_null();
        *tree = Value::Null;
        return existed;
    };

    let mut node = tree;
    for segment in parents {
        node = match node {
            Value::Object(map) => match map.get_mut(segment) {
                Some(next) => next,
                None => return false,
            },
            Value::Array(items) => {
                match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    Some(next) => next,
                    None => return false,
                }
            }
            _ => return false,
        };
    }

    match node {
        Value::Object(map) => map.remove(last).is_some(),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => {
                // Holes keep sibling indices stable.
                if let Some(slot) = items.get_mut(index) {
                    let existed = !slot.is_null();
                    *slot = Value::Null;
                    existed
                } else {
                    false
                }
            }
            _ => false,
        },
        _ => false,
    }
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    Some(
        as_object(node)?
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new())),
    )
}

/// Coerce `node` into an object in place and return its map.
///
/// Arrays are converted to objects keyed by index (holes dropped); scalars
/// and nulls are replaced by an empty object.
fn as_object(node: &mut Value) -> Option<&mut Map<String, Value>> {
    if !node.is_object() {
        let converted = match node.take() {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            _ => Map::new(),
        };
        *node = Value::Object(converted);
    }
    node.as_object_mut()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut tree = json!({});
        set_at(&mut tree, &p("chunks/0,0/1,1/groups/g1/status"), json!("idle"));
        assert_eq!(tree, json!({"chunks": {"0,0": {"1,1": {"groups": {"g1": {"status": "idle"}}}}}}));
    }

    #[test]
    fn set_below_scalar_replaces_it() {
        let mut tree = json!({"a": 5});
        set_at(&mut tree, &p("a/b"), json!(1));
        assert_eq!(tree, json!({"a": {"b": 1}}));
    }

    #[test]
    fn set_into_array_converts_to_object() {
        let mut tree = json!({"units": [{"id": "u0"}, null, {"id": "u2"}]});
        set_at(&mut tree, &p("units/u9"), json!({"id": "u9"}));
        assert_eq!(
            tree,
            json!({"units": {"0": {"id": "u0"}, "2": {"id": "u2"}, "u9": {"id": "u9"}}})
        );
    }

    #[test]
    fn null_set_deletes() {
        let mut tree = json!({"a": {"b": 1, "c": 2}});
        set_at(&mut tree, &p("a/b"), Value::Null);
        assert_eq!(tree, json!({"a": {"c": 2}}));
    }

    #[test]
    fn delete_missing_is_noop() {
        let mut tree = json!({"a": {"b": 1}});
        assert!(!delete_at(&mut tree, &p("a/x/y")));
        assert!(!delete_at(&mut tree, &p("a/b/c")));
        assert!(delete_at(&mut tree, &p("a/b")));
        assert_eq!(tree, json!({"a": {}}));
    }

    #[test]
    fn get_reads_objects_and_arrays() {
        let tree = json!({"a": [{"b": 1}]});
        assert_eq!(get_at(&tree, &p("a/0/b")), Some(&json!(1)));
        assert_eq!(get_at(&tree, &p("a/1")), None);
    }
}

//! Field Paths
//!
//! Dotted paths address fields inside a payload: `guarantor.name`,
//! `items.0.quantity`. The root record is the empty path.

use serde_json::{Map, Value};

/// Join a parent path and a child segment
pub fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

/// Path of the enclosing record, `None` for the root
pub fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('.').map(|(parent, _)| parent).unwrap_or(""))
}

/// Whether `path` is `ancestor` itself or lies below it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'.'))
}

/// Look up the value at a path
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Set the value at a path, creating intermediate objects as needed.
///
/// Numeric segments index into existing arrays; an index equal to the
/// array length appends. Returns `false` when the path cannot be reached.
pub fn assign(root: &mut Map<String, Value>, path: &str, value: Value) -> bool {
    let mut segments = path.split('.').peekable();
    let Some(first) = segments.next() else {
        return false;
    };
    if first.is_empty() {
        return false;
    }

    if segments.peek().is_none() {
        root.insert(first.to_string(), value);
        return true;
    }

    let mut current = root
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));

    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        current = match current {
            Value::Object(map) => {
                if last {
                    map.insert(segment.to_string(), value);
                    return true;
                }
                map.entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()))
            }
            Value::Array(items) => {
                let Ok(index) = segment.parse::<usize>() else {
                    return false;
                };
                if index == items.len() {
                    items.push(Value::Object(Map::new()));
                }
                let Some(slot) = items.get_mut(index) else {
                    return false;
                };
                if last {
                    *slot = value;
                    return true;
                }
                slot
            }
            _ => return false,
        };
    }

    false
}

/// Remove the value at a path. Array elements are removed, shifting the rest.
pub fn remove(root: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => root.remove(path),
        Some((parent, key)) => {
            let mut container = Value::Object(std::mem::take(root));
            let removed = match lookup_mut(&mut container, parent) {
                Some(Value::Object(map)) => map.remove(key),
                Some(Value::Array(items)) => key
                    .parse::<usize>()
                    .ok()
                    .filter(|i| *i < items.len())
                    .map(|i| items.remove(i)),
                _ => None,
            };
            if let Value::Object(map) = container {
                *root = map;
            }
            removed
        }
    }
}

fn lookup_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

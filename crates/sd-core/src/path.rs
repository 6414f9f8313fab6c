//! Dot-notation value paths with array-index support
//!
//! Paths address into JSON value trees: `user.name`, `items[0].id`,
//! `grid[1][2]`. Used by the state store, the condition evaluator, and
//! variable-mutation actions.

use serde_json::Value;

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

/// Parse a dot path into segments
///
/// Returns None for malformed paths (empty segments, unclosed brackets,
/// non-numeric indexes).
pub fn parse(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();

    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }

        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if key.is_empty() {
                return None;
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &rest[bracket..];

            while let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']')?;
                let index: usize = stripped[..close].parse().ok()?;
                segments.push(Segment::Index(index));
                rest = &stripped[close + 1..];
            }
            if !rest.is_empty() {
                return None;
            }
        } else {
            segments.push(Segment::Key(rest.to_string()));
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Resolve a path against a value tree
///
/// Returns None if the path is malformed or any segment is missing.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse(path)?;
    let mut current = root;

    for segment in &segments {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }

    Some(current)
}

/// Set a value at a path, creating intermediate objects as needed
///
/// Intermediate keys that are missing (or not objects) are replaced with
/// objects. Array segments must already exist with a valid index; setting
/// one past the end pushes onto the array. Returns false if the path is
/// malformed or an index is out of range.
pub fn set(root: &mut Value, path: &str, value: Value) -> bool {
    let Some(segments) = parse(path) else {
        return false;
    };

    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;

        match segment {
            Segment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(serde_json::Map::new());
                }
                let map = current.as_object_mut().expect("just ensured object");
                if last {
                    map.insert(key.clone(), value);
                    return true;
                }
                current = map.entry(key.clone()).or_insert(Value::Null);
            }
            Segment::Index(index) => {
                let Some(array) = current.as_array_mut() else {
                    return false;
                };
                if last {
                    if *index < array.len() {
                        array[*index] = value;
                    } else if *index == array.len() {
                        array.push(value);
                    } else {
                        return false;
                    }
                    return true;
                }
                match array.get_mut(*index) {
                    Some(next) => current = next,
                    None => return false,
                }
            }
        }
    }

    false
}

/// Remove the value at a path
///
/// Returns the removed value, or None if the path did not resolve.
pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let segments = parse(path)?;
    let (last, parents) = segments.split_last()?;

    let mut current = root;
    for segment in parents {
        current = match segment {
            Segment::Key(key) => current.as_object_mut()?.get_mut(key)?,
            Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }

    match last {
        Segment::Key(key) => current.as_object_mut()?.remove(key),
        Segment::Index(index) => {
            let array = current.as_array_mut()?;
            if *index < array.len() {
                Some(array.remove(*index))
            } else {
                None
            }
        }
    }
}

/// Compare two values numerically if both are numbers
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

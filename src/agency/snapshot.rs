use serde_json::{Map, Value};

use crate::error::{Result, SupervisionError};

/// Non-empty segments of a slash-separated agency path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Canonical form of a path: leading slash, no trailing or doubled slashes.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments(path) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Joins `base` and `rest` into one canonical path.
pub fn join(base: &str, rest: &str) -> String {
    normalize(&format!("{}/{}", base, rest))
}

/// Point-in-time, read-only view of (a subtree of) the agency.
///
/// Every node is a JSON value: objects expose named children (kept sorted by
/// key), everything else is a scalar or an array. Paths are slash-separated
/// and relative to the snapshot root; array elements can be addressed by
/// their numeric position.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    root: Value,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Value at `path`, if present.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = match node {
                Value::Object(children) => children.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Value at `path`, or `NotFound`.
    pub fn get(&self, path: &str) -> Result<&Value> {
        self.lookup(path)
            .ok_or_else(|| SupervisionError::NotFound(normalize(path)))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub fn get_str(&self, path: &str) -> Result<&str> {
        self.get(path)?
            .as_str()
            .ok_or_else(|| SupervisionError::malformed(normalize(path), "string"))
    }

    pub fn get_u64(&self, path: &str) -> Result<u64> {
        self.get(path)?
            .as_u64()
            .ok_or_else(|| SupervisionError::malformed(normalize(path), "unsigned integer"))
    }

    /// Named children of the object at `path`.
    pub fn children(&self, path: &str) -> Result<&Map<String, Value>> {
        self.get(path)?
            .as_object()
            .ok_or_else(|| SupervisionError::malformed(normalize(path), "object"))
    }

    /// Child names at `path`; empty when the path is missing or not an object.
    pub fn child_keys(&self, path: &str) -> Vec<&str> {
        self.lookup(path)
            .and_then(Value::as_object)
            .map(|children| children.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Owned copy of the subtree at `path` (empty when missing).
    pub fn subtree(&self, path: &str) -> Snapshot {
        self.lookup(path)
            .cloned()
            .map(Snapshot::new)
            .unwrap_or_default()
    }

    /// Writes `value` at `path`, creating intermediate objects. Scalars in
    /// the way are replaced by objects.
    pub(crate) fn set(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            self.root = value;
            return;
        };

        let mut node = &mut self.root;
        for segment in parents {
            node = object_mut(node)
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        object_mut(node).insert(last.to_string(), value);
    }

    /// Removes the node at `path`. Returns whether anything was removed.
    pub(crate) fn delete(&mut self, path: &str) -> bool {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            self.root = Value::Object(Map::new());
            return true;
        };

        let mut node = &mut self.root;
        for segment in parents {
            node = match node {
                Value::Object(children) => match children.get_mut(*segment) {
                    Some(child) => child,
                    None => return false,
                },
                _ => return false,
            };
        }
        match node {
            Value::Object(children) => children.remove(*last).is_some(),
            _ => false,
        }
    }
}

fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(children) => children,
        _ => unreachable!("node was just replaced by an object"),
    }
}

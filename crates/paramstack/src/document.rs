//! Generic document helpers shared by every source.
//!
//! A document is a `serde_json::Value` rooted at an object. Flat sources
//! (properties files, environment, command line) describe it with keys such
//! as `db.pool.size`, `list[0]` or `map.key`; [`unflatten`] turns those into
//! the nested form and [`deep_merge`] layers one document onto another.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

/// One step in a property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named field or map key.
    Field(String),
    /// A concrete list position.
    Index(usize),
    /// Placeholder for "any list position", rendered as `[<n>]`.
    AnyIndex,
    /// Placeholder for "any map key", rendered as `<xxx>`.
    AnyKey,
}

/// A structured property path that renders to the dotted/bracketed wire form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a flat key such as `a.b[2].c`.
    ///
    /// A backslash escapes the next character, so `a\.b` is a single field
    /// named `a.b`.
    pub fn parse(key: &str) -> std::result::Result<Self, String> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = key.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(format!("dangling escape at end of '{}'", key)),
                },
                '.' => {
                    if !current.is_empty() {
                        segments.push(PathSegment::Field(std::mem::take(&mut current)));
                    }
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(PathSegment::Field(std::mem::take(&mut current)));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(other) => {
                                return Err(format!(
                                    "unexpected '{}' inside index in '{}'",
                                    other, key
                                ))
                            }
                            None => return Err(format!("unterminated index in '{}'", key)),
                        }
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| format!("empty or oversized index in '{}'", key))?;
                    segments.push(PathSegment::Index(index));
                }
                ']' => return Err(format!("unbalanced ']' in '{}'", key)),
                other => current.push(other),
            }
        }
        if !current.is_empty() {
            segments.push(PathSegment::Field(current));
        }
        if segments.is_empty() {
            return Err("empty key".to_string());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut path = self.clone();
        path.push(segment);
        path
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    for c in name.chars() {
                        if matches!(c, '.' | '[' | ']' | '\\') {
                            f.write_str("\\")?;
                        }
                        write!(f, "{}", c)?;
                    }
                }
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
                PathSegment::AnyIndex => f.write_str("[<n>]")?,
                PathSegment::AnyKey => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str("<xxx>")?;
                }
            }
        }
        Ok(())
    }
}

/// Intermediate tree used while expanding flat keys.
enum Node {
    Empty,
    Leaf(Value),
    Object(Vec<(String, Node)>),
    Indexed(BTreeMap<usize, Node>),
}

impl Node {
    fn insert(&mut self, key: &str, segments: &[PathSegment], value: Value) {
        let Some((first, rest)) = segments.split_first() else {
            if !matches!(self, Node::Empty | Node::Leaf(_)) {
                log::warn!("Key '{}' replaces a nested value with a scalar", key);
            }
            *self = Node::Leaf(value);
            return;
        };

        match first {
            PathSegment::Field(name) => {
                if !matches!(self, Node::Object(_)) {
                    if !matches!(self, Node::Empty) {
                        log::warn!("Key '{}' replaces an existing value with an object", key);
                    }
                    *self = Node::Object(Vec::new());
                }
                if let Node::Object(children) = self {
                    let position = match children.iter().position(|(k, _)| k == name) {
                        Some(position) => position,
                        None => {
                            children.push((name.clone(), Node::Empty));
                            children.len() - 1
                        }
                    };
                    children[position].1.insert(key, rest, value);
                }
            }
            PathSegment::Index(index) => {
                if !matches!(self, Node::Indexed(_)) {
                    if !matches!(self, Node::Empty) {
                        log::warn!("Key '{}' replaces an existing value with a list", key);
                    }
                    *self = Node::Indexed(BTreeMap::new());
                }
                if let Node::Indexed(children) = self {
                    children
                        .entry(*index)
                        .or_insert(Node::Empty)
                        .insert(key, rest, value);
                }
            }
            PathSegment::AnyIndex | PathSegment::AnyKey => {
                log::warn!("Key '{}' contains a placeholder segment and is ignored", key);
            }
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Empty => Value::Null,
            Node::Leaf(value) => value,
            Node::Object(children) => Value::Object(
                children
                    .into_iter()
                    .map(|(k, node)| (k, node.into_value()))
                    .collect(),
            ),
            // Sparse indexes collapse into a dense list in index order.
            Node::Indexed(children) => {
                Value::Array(children.into_values().map(Node::into_value).collect())
            }
        }
    }
}

/// Expands flat `key = value` pairs into a nested document.
///
/// Keys that cannot be parsed, or that start with a list index, are logged
/// and skipped. List indexes only order their entries: `list[3]` alone yields
/// a one-element list.
pub fn unflatten<I, K>(entries: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: AsRef<str>,
{
    let mut root = Node::Object(Vec::new());
    for (key, value) in entries {
        let key = key.as_ref();
        let path = match PropertyPath::parse(key) {
            Ok(path) => path,
            Err(reason) => {
                log::warn!("Ignoring malformed key '{}': {}", key, reason);
                continue;
            }
        };
        if !matches!(path.segments().first(), Some(PathSegment::Field(_))) {
            log::warn!("Ignoring key '{}': it must start with a name", key);
            continue;
        }
        root.insert(key, path.segments(), value);
    }
    root.into_value()
}

/// Renders a document back into flat `key`/`value` pairs.
///
/// Nulls and empty containers produce no entries.
pub fn flatten(document: &Value) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    flatten_into(&mut entries, &mut PropertyPath::new(), document);
    entries
}

fn flatten_into(entries: &mut Vec<(String, String)>, path: &mut PropertyPath, value: &Value) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                path.push(PathSegment::Field(key.clone()));
                flatten_into(entries, path, child);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(PathSegment::Index(index));
                flatten_into(entries, path, child);
                path.pop();
            }
        }
        Value::String(s) => entries.push((path.to_string(), s.clone())),
        other => entries.push((path.to_string(), other.to_string())),
    }
}

/// Layers `overlay` onto `target`.
///
/// Objects merge key by key, lists append, and anything else in the overlay
/// replaces what was there.
pub fn deep_merge(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(existing), Value::Object(incoming)) => merge_objects(existing, incoming),
        (Value::Array(existing), Value::Array(incoming)) => existing.extend(incoming),
        (target, overlay) => *target = overlay,
    }
}

fn merge_objects(existing: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match existing.get_mut(&key) {
            Some(slot) => deep_merge(slot, value),
            None => {
                existing.insert(key, value);
            }
        }
    }
}

/// Short name of a value's JSON kind, for diagnostics.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Shapes an incoming document to fit the settings schema before merging.
//!
//! Flat sources deliver every value as text and every key as written by the
//! user. This pass resolves keys against declared properties, converts text
//! to the declared scalar type, and reports (then drops) whatever cannot be
//! applied, so a single bad value never sinks the rest of the document.

use std::collections::VecDeque;

use serde_json::{Map, Number, Value};

use crate::document::{deep_merge, kind_of, PathSegment, PropertyPath};
use crate::problem::{MergeProblem, ProblemHandler, ProblemKind};
use crate::schema::{primary_type, SchemaView, Shape};

struct Normalizer<'a> {
    view: SchemaView<'a>,
    problems: &'a dyn ProblemHandler,
}

/// Normalises `document` against the root of `view`.
pub(crate) fn normalize(
    view: SchemaView<'_>,
    document: Value,
    problems: &dyn ProblemHandler,
) -> Value {
    let normalizer = Normalizer { view, problems };
    normalizer
        .node(view.root(), document, &mut PropertyPath::new())
        .unwrap_or_else(|| Value::Object(Map::new()))
}

impl<'a> Normalizer<'a> {
    fn report(&self, kind: ProblemKind, path: &PropertyPath, value: Value, detail: String) {
        self.problems.handle(&MergeProblem {
            kind,
            path: path.to_string(),
            value,
            detail,
        });
    }

    fn node(&self, schema: &'a Value, value: Value, path: &mut PropertyPath) -> Option<Value> {
        let resolved = self.view.resolve(schema);
        let shape = self.view.shape(resolved.node);

        if value.is_null() {
            let accepts_null = resolved.nullable
                || matches!(shape, Shape::Any)
                || primary_type(resolved.node) == Some("null");
            if accepts_null {
                return Some(Value::Null);
            }
            self.report(
                ProblemKind::TypeMismatch,
                path,
                value,
                format!("{} cannot be null", self.view.type_label(&resolved)),
            );
            return None;
        }

        match shape {
            Shape::Object(properties) => self.object(resolved.node, properties, value, path),
            Shape::Map(values) => match value {
                Value::Object(entries) => {
                    let mut out = Map::new();
                    for (key, child) in entries {
                        path.push(PathSegment::Field(key.clone()));
                        if let Some(child) = self.node(values, child, path) {
                            out.insert(key, child);
                        }
                        path.pop();
                    }
                    Some(Value::Object(out))
                }
                other => self.mismatch(path, other, "a map"),
            },
            Shape::Array(items) => match value {
                Value::Array(elements) => {
                    let mut out = Vec::with_capacity(elements.len());
                    for (index, child) in elements.into_iter().enumerate() {
                        path.push(PathSegment::Index(index));
                        if let Some(child) = self.node(items, child, path) {
                            out.push(child);
                        }
                        path.pop();
                    }
                    Some(Value::Array(out))
                }
                other => self.mismatch(path, other, "a list"),
            },
            Shape::Scalar => self.scalar(resolved.node, value, path),
            Shape::Any => Some(value),
        }
    }

    fn mismatch(&self, path: &PropertyPath, value: Value, expected: &str) -> Option<Value> {
        let detail = format!("expected {}, found {}", expected, kind_of(&value));
        self.report(ProblemKind::TypeMismatch, path, value, detail);
        None
    }

    fn object(
        &self,
        node: &'a Value,
        properties: &'a Map<String, Value>,
        value: Value,
        path: &mut PropertyPath,
    ) -> Option<Value> {
        let incoming = match value {
            Value::Object(incoming) => incoming,
            other => return self.mismatch(path, other, "an object"),
        };
        let additional = match node.get("additionalProperties") {
            Some(schema @ Value::Object(_)) => Some(schema),
            _ => None,
        };

        let mut out = Map::new();
        let mut queue: VecDeque<(String, Value)> = incoming.into_iter().collect();
        while let Some((key, child)) = queue.pop_front() {
            if let Some(name) = resolve_key(properties, &key) {
                path.push(PathSegment::Field(name.to_string()));
                if let Some(child) = self.node(&properties[name], child, path) {
                    insert_merged(&mut out, name.to_string(), child);
                }
                path.pop();
                continue;
            }
            if let Some(schema) = additional {
                path.push(PathSegment::Field(key.clone()));
                if let Some(child) = self.node(schema, child, path) {
                    insert_merged(&mut out, key, child);
                }
                path.pop();
                continue;
            }
            // `pool.size` from a separator-substituting source may really be `pool_size`.
            let child = match child {
                Value::Object(nested) if has_underscored_property(properties, &key) => {
                    for (sub, grandchild) in nested {
                        queue.push_back((format!("{}_{}", key, sub), grandchild));
                    }
                    continue;
                }
                other => other,
            };
            path.push(PathSegment::Field(key));
            self.report(
                ProblemKind::UnknownProperty,
                path,
                child,
                "no such property".to_string(),
            );
            path.pop();
        }
        Some(Value::Object(out))
    }

    fn scalar(&self, node: &Value, value: Value, path: &PropertyPath) -> Option<Value> {
        let coerced = match primary_type(node) {
            Some("integer") => match integer_from(&value, node) {
                Ok(coerced) => coerced,
                Err(detail) => {
                    self.report(ProblemKind::MalformedValue, path, value, detail);
                    return None;
                }
            },
            Some("number") => match number_from(&value) {
                Some(coerced) => coerced,
                None => return self.mismatch(path, value, "a number"),
            },
            Some("boolean") => match boolean_from(&value) {
                Some(coerced) => coerced,
                None => return self.mismatch(path, value, "a boolean"),
            },
            Some("string") => match value {
                Value::String(_) => value,
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => return self.mismatch(path, other, "a string"),
            },
            _ => value,
        };

        let Some(allowed) = allowed_values(node) else {
            return Some(coerced);
        };
        if allowed.contains(&&coerced) {
            return Some(coerced);
        }
        if let Value::String(text) = &coerced {
            let folded = allowed.iter().find(|candidate| {
                candidate
                    .as_str()
                    .is_some_and(|c| c.eq_ignore_ascii_case(text))
            });
            if let Some(folded) = folded {
                return Some((*folded).clone());
            }
        }
        let detail = format!(
            "not one of {}",
            allowed
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.report(ProblemKind::MalformedValue, path, coerced, detail);
        None
    }
}

/// Finds the declared property a document key refers to: exact match first,
/// then ignoring ASCII case and treating `-` as `_`.
fn resolve_key<'p>(properties: &'p Map<String, Value>, key: &str) -> Option<&'p str> {
    if let Some((name, _)) = properties.get_key_value(key) {
        return Some(name.as_str());
    }
    let wanted = fold_key(key);
    properties
        .keys()
        .find(|name| fold_key(name) == wanted)
        .map(String::as_str)
}

fn fold_key(key: &str) -> String {
    key.chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

fn has_underscored_property(properties: &Map<String, Value>, key: &str) -> bool {
    let prefix = format!("{}_", fold_key(key));
    properties.keys().any(|name| fold_key(name).starts_with(&prefix))
}

fn insert_merged(out: &mut Map<String, Value>, key: String, value: Value) {
    match out.get_mut(&key) {
        Some(existing) => deep_merge(existing, value),
        None => {
            out.insert(key, value);
        }
    }
}

fn allowed_values(node: &Value) -> Option<Vec<&Value>> {
    if let Some(Value::Array(values)) = node.get("enum") {
        return Some(values.iter().collect());
    }
    if let Some(constant) = node.get("const") {
        return Some(vec![constant]);
    }
    for keyword in ["oneOf", "anyOf"] {
        if let Some(Value::Array(branches)) = node.get(keyword) {
            let mut values = Vec::new();
            for branch in branches {
                match (branch.get("const"), branch.get("enum")) {
                    (Some(constant), _) => values.push(constant),
                    (None, Some(Value::Array(listed))) => values.extend(listed.iter()),
                    _ => return None,
                }
            }
            return Some(values);
        }
    }
    None
}

fn integer_bounds(format: Option<&str>) -> (i128, i128) {
    match format {
        Some("int8") => (i8::MIN.into(), i8::MAX.into()),
        Some("int16") => (i16::MIN.into(), i16::MAX.into()),
        Some("int32") => (i32::MIN.into(), i32::MAX.into()),
        Some("uint8") => (0, u8::MAX.into()),
        Some("uint16") => (0, u16::MAX.into()),
        Some("uint32") => (0, u32::MAX.into()),
        Some("uint64") | Some("uint") => (0, u64::MAX.into()),
        _ => (i64::MIN.into(), u64::MAX.into()),
    }
}

fn integer_from(value: &Value, node: &Value) -> Result<Value, String> {
    let parsed: Option<i128> = match value {
        Value::String(text) => text.trim().parse::<i128>().ok(),
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e18)
                    .map(|f| f as i128)
            }),
        _ => None,
    };
    let format = node.get("format").and_then(Value::as_str);
    let Some(parsed) = parsed else {
        return Err(format!("expected an integer, found {}", kind_of(value)));
    };
    let (min, max) = integer_bounds(format);
    if parsed < min || parsed > max {
        return Err(format!(
            "{} is out of range for {}",
            parsed,
            format.unwrap_or("integer")
        ));
    }
    let number = match i64::try_from(parsed) {
        Ok(small) => Number::from(small),
        Err(_) => Number::from(u64::try_from(parsed).map_err(|e| e.to_string())?),
    };
    Ok(Value::Number(number))
}

fn number_from(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn boolean_from(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(text) if text.trim().eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
        Value::String(text) if text.trim().eq_ignore_ascii_case("false") => {
            Some(Value::Bool(false))
        }
        _ => None,
    }
}

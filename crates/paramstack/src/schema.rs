//! Settings capability interface.
//!
//! Settings types describe themselves through a derived JSON Schema
//! (`#[derive(JsonSchema)]`). The codec uses it to coerce flat string values
//! and spot unknown keys, the catalog walks it to list every property. Doc
//! comments land in the schema as `description`, so no separate capture step
//! is needed at runtime.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Everything a type needs to be aggregated and catalogued.
///
/// `Clone` lets the aggregator keep the pre-source value when a source fails.
pub trait Settings: Serialize + DeserializeOwned + JsonSchema + Clone + Send + 'static {}

impl<T> Settings for T where T: Serialize + DeserializeOwned + JsonSchema + Clone + Send + 'static {}

static SCHEMAS: OnceLock<Mutex<HashMap<TypeId, Arc<Value>>>> = OnceLock::new();

/// Returns the schema of `T`, generating it on first use.
///
/// Schemas are cached for the life of the process.
pub fn schema_for<T: JsonSchema + 'static>() -> Arc<Value> {
    let cache = SCHEMAS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut schemas = cache.lock().unwrap_or_else(PoisonError::into_inner);
    schemas
        .entry(TypeId::of::<T>())
        .or_insert_with(|| Arc::new(schemars::schema_for!(T).to_value()))
        .clone()
}

/// A schema node after following references and unwrapping `Option`.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    /// Name of the definition the node came from, if it was a named type.
    pub name: Option<&'a str>,
    pub node: &'a Value,
    pub nullable: bool,
}

/// What kind of value a resolved schema node accepts.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    /// A single value: string, number, boolean or enumeration.
    Scalar,
    /// A struct-like object with named properties.
    Object(&'a Map<String, Value>),
    /// A map from arbitrary keys to values of one schema.
    Map(&'a Value),
    /// A list of values of one schema.
    Array(&'a Value),
    /// Anything goes (unconstrained or a union the walker does not split).
    Any,
}

/// Read-only navigation over a root schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaView<'a> {
    root: &'a Value,
}

const MAX_INDIRECTION: usize = 32;

impl<'a> SchemaView<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &'a Value {
        self.root
    }

    /// Name of the root type (`title` of the root schema).
    pub fn root_name(&self) -> Option<&'a str> {
        self.root.get("title").and_then(Value::as_str)
    }

    pub fn resolve(&self, node: &'a Value) -> Resolved<'a> {
        let mut resolved = Resolved {
            name: None,
            node,
            nullable: false,
        };
        for _ in 0..MAX_INDIRECTION {
            let current = resolved.node;
            if let Some(reference) = current.get("$ref").and_then(Value::as_str) {
                match self.definition(reference) {
                    Some((name, target)) => {
                        resolved.name = Some(name);
                        resolved.node = target;
                        continue;
                    }
                    None => {
                        log::debug!("Unresolvable schema reference {}", reference);
                        return resolved;
                    }
                }
            }
            if let Some(single) = single_non_null_branch(current) {
                resolved.nullable = true;
                resolved.node = single;
                continue;
            }
            if let Some(Value::Array(all)) = current.get("allOf") {
                if all.len() == 1 {
                    resolved.node = &all[0];
                    continue;
                }
            }
            break;
        }
        if primary_type(resolved.node).is_some() && type_list_has_null(resolved.node) {
            resolved.nullable = true;
        }
        resolved
    }

    fn definition(&self, reference: &'a str) -> Option<(&'a str, &'a Value)> {
        if reference == "#" {
            return Some((self.root_name().unwrap_or("#"), self.root));
        }
        for (prefix, container) in [("#/$defs/", "$defs"), ("#/definitions/", "definitions")] {
            if let Some(name) = reference.strip_prefix(prefix) {
                let target = self.root.get(container)?.get(unescape_pointer(name).as_ref())?;
                return Some((name, target));
            }
        }
        None
    }

    pub fn shape(&self, node: &'a Value) -> Shape<'a> {
        if node.get("enum").is_some() || node.get("const").is_some() {
            return Shape::Scalar;
        }
        match primary_type(node) {
            Some("object") => {
                if let Some(Value::Object(properties)) = node.get("properties") {
                    return Shape::Object(properties);
                }
                match node.get("additionalProperties") {
                    Some(value @ Value::Object(_)) => Shape::Map(value),
                    _ => Shape::Any,
                }
            }
            Some("array") => match node.get("items") {
                Some(items @ Value::Object(_)) => Shape::Array(items),
                _ => Shape::Any,
            },
            Some(_) => Shape::Scalar,
            None => {
                if is_constant_union(node) {
                    Shape::Scalar
                } else {
                    Shape::Any
                }
            }
        }
    }

    /// Human-readable type label: the definition name for named types,
    /// otherwise the JSON type with its format, e.g. `integer(uint16)`.
    pub fn type_label(&self, resolved: &Resolved<'a>) -> String {
        if let Some(name) = resolved.name {
            return name.to_string();
        }
        let node = resolved.node;
        if node.get("enum").is_some() || is_constant_union(node) {
            return "enum".to_string();
        }
        match (primary_type(node), node.get("format").and_then(Value::as_str)) {
            (Some("object"), _) => match self.shape(node) {
                Shape::Map(_) => "map".to_string(),
                _ => "object".to_string(),
            },
            (Some(kind), Some(format)) => format!("{}({})", kind, format),
            (Some(kind), None) => kind.to_string(),
            (None, _) => "any".to_string(),
        }
    }
}

/// First non-`null` entry of the `type` keyword.
pub fn primary_type(node: &Value) -> Option<&str> {
    match node.get("type")? {
        Value::String(kind) => Some(kind.as_str()),
        Value::Array(kinds) => kinds
            .iter()
            .filter_map(Value::as_str)
            .find(|kind| *kind != "null"),
        _ => None,
    }
}

fn type_list_has_null(node: &Value) -> bool {
    matches!(node.get("type"), Some(Value::Array(kinds)) if kinds.iter().any(|k| k == "null"))
}

fn is_null_schema(node: &Value) -> bool {
    node.get("type").and_then(Value::as_str) == Some("null")
}

fn single_non_null_branch(node: &Value) -> Option<&Value> {
    for keyword in ["anyOf", "oneOf"] {
        if let Some(Value::Array(branches)) = node.get(keyword) {
            let mut rest = branches.iter().filter(|b| !is_null_schema(b));
            let first = rest.next()?;
            if rest.next().is_none() && branches.len() > 1 {
                return Some(first);
            }
        }
    }
    None
}

fn is_constant_union(node: &Value) -> bool {
    ["anyOf", "oneOf"].iter().any(|keyword| {
        matches!(node.get(*keyword), Some(Value::Array(branches))
            if !branches.is_empty()
                && branches.iter().all(|b| b.get("const").is_some() || b.get("enum").is_some()))
    })
}

fn unescape_pointer(token: &str) -> std::borrow::Cow<'_, str> {
    if token.contains('~') {
        token.replace("~1", "/").replace("~0", "~").into()
    } else {
        token.into()
    }
}

use regex::Regex;
use serde_json::{Map, Value};

use crate::document::{PathSegment, PropertyPath};
use crate::schema::{SchemaView, Shape};

use super::{CatalogOptions, PropertyDescriptor};

/// Named types that serialise as structures but are set as single values.
const BUILTIN_TERMINAL_TYPES: &[&str] = &["Duration", "SystemTime"];

const MASKED: &str = "********";

pub(crate) struct Walker<'a> {
    view: SchemaView<'a>,
    options: &'a CatalogOptions,
    out: Vec<PropertyDescriptor>,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(view: SchemaView<'a>, options: &'a CatalogOptions) -> Self {
        Self {
            view,
            options,
            out: Vec::new(),
        }
    }

    pub(crate) fn run(mut self, defaults: &Value) -> Vec<PropertyDescriptor> {
        let root = self.view.resolve(self.view.root());
        let visited: Vec<&'a str> = self.view.root_name().into_iter().collect();
        match self.view.shape(root.node) {
            Shape::Object(properties) => {
                self.object(properties, Some(defaults), &mut PropertyPath::new(), None, visited)
            }
            _ => log::warn!("Settings type has no named properties to document"),
        }
        self.out
    }

    fn object(
        &mut self,
        properties: &'a Map<String, Value>,
        defaults: Option<&Value>,
        path: &mut PropertyPath,
        comment: Option<&str>,
        visited: Vec<&'a str>,
    ) {
        for (name, schema) in properties {
            path.push(PathSegment::Field(name.clone()));
            let default = defaults.and_then(|d| d.get(name));
            self.property(schema, default, path, comment, visited.clone());
            path.pop();
        }
    }

    fn property(
        &mut self,
        schema: &'a Value,
        default: Option<&Value>,
        path: &mut PropertyPath,
        parent_comment: Option<&str>,
        mut visited: Vec<&'a str>,
    ) {
        let resolved = self.view.resolve(schema);
        let shape = self.view.shape(resolved.node);
        let type_name = self.view.type_label(&resolved);
        let comment = join_comments(parent_comment, own_comment(schema));

        let undocumented = matches_any(&self.options.undocumented_types, &type_name);
        let terminal = matches!(shape, Shape::Scalar | Shape::Any)
            || BUILTIN_TERMINAL_TYPES.contains(&type_name.as_str())
            || matches_any(&self.options.terminal_types, &type_name);

        if undocumented || terminal {
            let secret = is_secret(schema) || is_secret(resolved.node);
            let default_value = render_default(default).map(|value| {
                if secret && !value.is_empty() {
                    MASKED.to_string()
                } else {
                    value
                }
            });
            let name = self.render_name(path);
            self.out.push(PropertyDescriptor {
                can_be_env_var: !name.contains('[') && !name.contains(']'),
                name,
                type_name,
                undocumented,
                comment,
                default_value,
            });
            return;
        }

        match shape {
            Shape::Map(values) => {
                path.push(PathSegment::AnyKey);
                self.property(values, None, path, comment.as_deref(), visited);
                path.pop();
            }
            Shape::Array(items) => {
                path.push(PathSegment::AnyIndex);
                self.property(items, None, path, comment.as_deref(), visited);
                path.pop();
            }
            Shape::Object(properties) => {
                if let Some(name) = resolved.name {
                    if visited.contains(&name) {
                        log::debug!("Not documenting {} again inside itself at {}", name, path);
                        return;
                    }
                    visited.push(name);
                }
                self.object(properties, default, path, comment.as_deref(), visited);
            }
            Shape::Scalar | Shape::Any => {}
        }
    }

    fn render_name(&self, path: &PropertyPath) -> String {
        let prefix = self.options.prefix.as_str();
        if prefix.is_empty() {
            path.to_string()
        } else if prefix.ends_with('.') {
            format!("{}{}", prefix, path)
        } else {
            format!("{}.{}", prefix, path)
        }
    }
}

fn matches_any(patterns: &[Regex], type_name: &str) -> bool {
    patterns.iter().any(|pattern| pattern.is_match(type_name))
}

/// Explicit `x-comment` first, then the doc comment captured as `description`.
fn own_comment(schema: &Value) -> Option<&str> {
    ["x-comment", "description"]
        .iter()
        .filter_map(|key| schema.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|comment| !comment.is_empty())
}

fn join_comments(parent: Option<&str>, own: Option<&str>) -> Option<String> {
    match (parent, own) {
        (Some(parent), Some(own)) => Some(format!("{}, {}", parent, own)),
        (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
        (None, None) => None,
    }
}

fn is_secret(schema: &Value) -> bool {
    schema.get("x-secret").and_then(Value::as_bool) == Some(true)
}

fn render_default(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        scalar @ (Value::Bool(_) | Value::Number(_)) => Some(scalar.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

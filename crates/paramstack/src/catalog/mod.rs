//! Catalog of every settable property of a settings type.
//!
//! The walk follows the derived schema: scalars are leaves, lists and maps
//! add `[<n>]` and `<xxx>` placeholders, nested types are entered once per
//! branch so self-referential types terminate.

mod property;
mod walker;

pub use property::PropertyDescriptor;

use regex::Regex;

use crate::schema::{schema_for, SchemaView, Settings};

/// Controls how [`walk`] classifies types and names properties.
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    /// Prepended to every property name; a `.` is added if missing.
    pub prefix: String,
    /// Types (matched against the type label) listed as single values.
    pub terminal_types: Vec<Regex>,
    /// Types listed as opaque entries without their contents.
    pub undocumented_types: Vec<Regex>,
}

impl CatalogOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn terminal_type(mut self, pattern: Regex) -> Self {
        self.terminal_types.push(pattern);
        self
    }

    pub fn undocumented_type(mut self, pattern: Regex) -> Self {
        self.undocumented_types.push(pattern);
        self
    }
}

/// Lists the properties of `P`, taking defaults from `default`.
pub fn walk<P: Settings>(default: &P, options: &CatalogOptions) -> Vec<PropertyDescriptor> {
    let schema = schema_for::<P>();
    let defaults = match serde_json::to_value(default) {
        Ok(defaults) => defaults,
        Err(e) => {
            log::warn!("Unable to read default values: {}", e);
            serde_json::Value::Null
        }
    };
    walker::Walker::new(SchemaView::new(&schema), options).run(&defaults)
}

//! Document codec: text formats in and out, and merging documents onto
//! typed settings.

mod normalize;
pub mod properties;

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::document::{deep_merge, flatten, kind_of, unflatten};
use crate::error::CodecError;
use crate::problem::{MergeProblem, ProblemHandler, ProblemKind};
use crate::schema::{schema_for, SchemaView, Settings};

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Properties,
    Yaml,
    Json,
    Toml,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Properties, Format::Yaml, Format::Json, Format::Toml];

    /// File extensions (without the dot) recognised for this format.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Format::Properties => &["properties"],
            Format::Yaml => &["yaml", "yml"],
            Format::Json => &["json"],
            Format::Toml => &["toml"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Properties => "properties",
            Format::Yaml => "YAML",
            Format::Json => "JSON",
            Format::Toml => "TOML",
        }
    }

    /// Whether `path` has one of this format's extensions (case-insensitive).
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Format> {
        Format::ALL.into_iter().find(|format| format.matches(path))
    }
}

/// Parses `bytes` as a document in `format`.
///
/// Empty content decodes to an empty object; any other non-object root is
/// rejected.
pub fn decode(bytes: &[u8], format: Format) -> Result<Value, CodecError> {
    let text = String::from_utf8(bytes.to_vec())?;
    let document = match format {
        Format::Properties => {
            let entries = properties::parse(&text)?;
            unflatten(entries.into_iter().map(|(k, v)| (k, Value::String(v))))
        }
        Format::Yaml => serde_yaml::from_str::<Value>(&text)?,
        Format::Json => {
            if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str::<Value>(&text).map_err(CodecError::ParseJson)?
            }
        }
        Format::Toml => toml::from_str::<Value>(&text)?,
    };
    match document {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(document),
        other => Err(CodecError::NotAnObject(kind_of(&other).to_string())),
    }
}

/// Renders `document` as text in `format`.
pub fn encode(document: &Value, format: Format) -> Result<String, CodecError> {
    let render_error = |message: String| CodecError::Render {
        format: format.name(),
        message,
    };
    match format {
        Format::Properties => Ok(properties::render(&flatten(document))),
        Format::Yaml => serde_yaml::to_string(document).map_err(|e| render_error(e.to_string())),
        Format::Json => {
            serde_json::to_string_pretty(document).map_err(|e| render_error(e.to_string()))
        }
        Format::Toml => toml::to_string_pretty(document).map_err(|e| render_error(e.to_string())),
    }
}

/// Binds the codec to one settings type and its schema.
pub struct SettingsCodec<P> {
    schema: Arc<Value>,
    _settings: PhantomData<fn() -> P>,
}

impl<P: Settings> SettingsCodec<P> {
    pub fn new() -> Self {
        Self {
            schema: schema_for::<P>(),
            _settings: PhantomData,
        }
    }

    pub fn schema(&self) -> SchemaView<'_> {
        SchemaView::new(&self.schema)
    }

    pub fn decode(&self, bytes: &[u8], format: Format) -> Result<Value, CodecError> {
        decode(bytes, format)
    }

    pub fn encode(&self, document: &Value, format: Format) -> Result<String, CodecError> {
        encode(document, format)
    }

    /// Structural form of `settings`, used for snapshots and merging.
    pub fn to_document(&self, settings: &P) -> Result<Value, CodecError> {
        serde_json::to_value(settings).map_err(CodecError::Serialize)
    }

    /// Deep-merges `document` onto `base`.
    ///
    /// Values that do not fit the settings type are reported to `problems`
    /// and left out; everything else is applied.
    pub fn merge_apply(
        &self,
        document: Value,
        base: P,
        problems: &dyn ProblemHandler,
    ) -> Result<P, CodecError> {
        let overlay = normalize::normalize(self.schema(), document, problems);
        if matches!(&overlay, Value::Object(map) if map.is_empty()) {
            return Ok(base);
        }
        let base = self.to_document(&base)?;
        let mut merged = base.clone();
        deep_merge(&mut merged, overlay.clone());
        match serde_json::from_value(merged) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                log::debug!("Merged document does not fit, applying key by key: {}", e);
                self.apply_by_key(base, overlay, problems)
            }
        }
    }

    /// Applies each top-level entry of `overlay` on its own, reporting and
    /// leaving out the entries that cannot be turned into `P`.
    fn apply_by_key(
        &self,
        mut merged: Value,
        overlay: Value,
        problems: &dyn ProblemHandler,
    ) -> Result<P, CodecError> {
        let Value::Object(entries) = overlay else {
            return serde_json::from_value(merged).map_err(CodecError::Deserialize);
        };
        for (key, value) in entries {
            let mut candidate = merged.clone();
            let mut single = Map::new();
            single.insert(key.clone(), value.clone());
            deep_merge(&mut candidate, Value::Object(single));
            match serde_json::from_value::<P>(candidate.clone()) {
                Ok(_) => merged = candidate,
                Err(e) => problems.handle(&MergeProblem {
                    kind: ProblemKind::MalformedValue,
                    path: key,
                    value,
                    detail: e.to_string(),
                }),
            }
        }
        serde_json::from_value(merged).map_err(CodecError::Deserialize)
    }
}

impl<P: Settings> Default for SettingsCodec<P> {
    fn default() -> Self {
        Self::new()
    }
}

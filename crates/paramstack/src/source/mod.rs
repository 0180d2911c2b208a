//! Sources contribute values to the settings object, in registration order.

mod cli;
mod env;
mod file;
mod secrets;
mod system;

pub use cli::CommandLineSource;
pub use env::EnvironmentSource;
pub use file::{DirSource, EmbeddedSource, FileSource};
pub use secrets::SecretsSource;
pub use system::{SystemProperties, SystemPropertiesSource};

use std::path::Path;

use serde_json::Value;

use crate::codec::{Format, SettingsCodec};
use crate::document::unflatten;
use crate::error::SourceError;
use crate::problem::ProblemHandler;
use crate::schema::Settings;
use crate::watcher::ChangeWatcher;

/// One origin of configuration values.
pub trait Source<P>: Send + Sync {
    /// Short description used in log messages.
    fn name(&self) -> String;

    /// Merges this source's values onto `base` and returns the result.
    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError>;
}

/// What the aggregator lends to a source while it runs.
pub struct Services<'a, P> {
    codec: &'a SettingsCodec<P>,
    problems: &'a dyn ProblemHandler,
    watcher: &'a ChangeWatcher,
}

impl<'a, P: Settings> Services<'a, P> {
    pub fn new(
        codec: &'a SettingsCodec<P>,
        problems: &'a dyn ProblemHandler,
        watcher: &'a ChangeWatcher,
    ) -> Self {
        Self {
            codec,
            problems,
            watcher,
        }
    }

    pub fn codec(&self) -> &'a SettingsCodec<P> {
        self.codec
    }

    pub fn problem_handler(&self) -> &'a dyn ProblemHandler {
        self.problems
    }

    /// Asks the change watcher to observe `path`. Failures are logged and
    /// reported as `false`; they never fail the source.
    pub fn watch(&self, path: &Path) -> bool {
        match self.watcher.watch(path) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}", e);
                false
            }
        }
    }

    /// Decodes `bytes` and merges the result onto `base`.
    pub fn merge_bytes(
        &self,
        origin: &str,
        bytes: &[u8],
        format: Format,
        base: P,
    ) -> Result<P, SourceError> {
        let document = self
            .codec
            .decode(bytes, format)
            .map_err(|e| SourceError::codec(origin, e))?;
        self.merge(origin, document, base)
    }

    pub fn merge(&self, origin: &str, document: Value, base: P) -> Result<P, SourceError> {
        self.codec
            .merge_apply(document, base, self.problems)
            .map_err(|e| SourceError::codec(origin, e))
    }

    /// See [`prepare_properties`].
    pub fn prepare_properties<I, K, V>(
        &self,
        origin: &str,
        entries: I,
        prefix: Option<&str>,
        normalize_key: &dyn Fn(&str) -> String,
    ) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        prepare_properties(origin, entries, prefix, normalize_key)
    }
}

/// Builds a document from flat key/value pairs.
///
/// Every key, and the prefix, pass through `normalize_key`. With a non-empty
/// prefix only keys that start with it followed by `.` are kept, and the
/// prefix and dot are removed; everything else is dropped.
pub fn prepare_properties<I, K, V>(
    origin: &str,
    entries: I,
    prefix: Option<&str>,
    normalize_key: &dyn Fn(&str) -> String,
) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let prefix = prefix.filter(|p| !p.is_empty()).map(normalize_key);
    let mut flat = Vec::new();

    for (key, value) in entries {
        let key = normalize_key(key.as_ref());
        let key = match &prefix {
            None => key,
            Some(prefix) => match strip_name_prefix(&key, prefix) {
                Some(rest) => rest.to_string(),
                None => continue,
            },
        };
        if key.is_empty() {
            continue;
        }
        log::trace!("{}: {}", origin, key);
        flat.push((key, Value::String(value.into())));
    }

    unflatten(flat)
}

fn strip_name_prefix<'k>(key: &'k str, prefix: &str) -> Option<&'k str> {
    let rest = key.strip_prefix(prefix)?;
    if prefix.ends_with('.') {
        Some(rest)
    } else {
        rest.strip_prefix('.')
    }
}

/// A source backed by a closure.
pub struct FnSource<F> {
    name: String,
    apply: F,
}

impl<F> FnSource<F> {
    pub fn new(name: impl Into<String>, apply: F) -> Self {
        Self {
            name: name.into(),
            apply,
        }
    }
}

impl<P, F> Source<P> for FnSource<F>
where
    P: Settings,
    F: Fn(&Services<'_, P>, P) -> Result<P, SourceError> + Send + Sync,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        (self.apply)(services, base)
    }
}

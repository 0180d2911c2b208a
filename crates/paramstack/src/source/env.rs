use std::collections::BTreeMap;

use crate::error::SourceError;
use crate::schema::Settings;

use super::{Services, Source};

/// Values from environment variables.
///
/// Names are lower-cased and the separator (`_` by default) becomes `.`, so
/// with prefix `app` the variable `APP_DB_URL` sets `db.url`. Fields whose
/// names contain underscores are still reached: `APP_DB_POOL_SIZE` becomes
/// `db.pool.size`, which the merge resolves to `db.pool_size`.
#[derive(Debug, Clone)]
pub struct EnvironmentSource {
    prefix: Option<String>,
    separator: char,
    variables: Option<BTreeMap<String, String>>,
}

impl EnvironmentSource {
    /// Reads the process environment on every pass.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()).filter(|p: &String| !p.is_empty()),
            separator: '_',
            variables: None,
        }
    }

    /// Uses a fixed set of variables instead of the process environment.
    pub fn from_map<I, K, V>(variables: I, prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            variables: Some(
                variables
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Self::new(prefix)
        }
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    fn normalize(&self, key: &str) -> String {
        key.chars()
            .map(|c| if c == self.separator { '.' } else { c })
            .collect::<String>()
            .to_lowercase()
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        match &self.variables {
            Some(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }
}

impl<P: Settings> Source<P> for EnvironmentSource {
    fn name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("Environment ({})", prefix),
            None => "Environment".to_string(),
        }
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        let normalize = |key: &str| self.normalize(key);
        let document = services.prepare_properties(
            "Environment",
            self.snapshot(),
            self.prefix.as_deref(),
            &normalize,
        );
        services.merge("environment", document, base)
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::SourceError;
use crate::schema::Settings;

use super::{Services, Source};

/// Process-wide properties supplied by the host application, for example
/// from `-Dname=value` style launcher flags.
///
/// Keys are used verbatim; a backslash escapes a literal dot, so
/// `labels.app\.io` sets the map key `app.io`.
#[derive(Debug, Clone, Default)]
pub struct SystemProperties {
    values: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SystemProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SystemProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let properties = Self::new();
        for (key, value) in iter {
            properties.set(key, value);
        }
        properties
    }
}

#[derive(Debug, Clone)]
pub struct SystemPropertiesSource {
    properties: SystemProperties,
    prefix: Option<String>,
}

impl SystemPropertiesSource {
    pub fn new(properties: SystemProperties, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            properties,
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }
}

impl<P: Settings> Source<P> for SystemPropertiesSource {
    fn name(&self) -> String {
        "System properties".to_string()
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        let document = services.prepare_properties(
            "System properties",
            self.properties.entries(),
            self.prefix.as_deref(),
            &|key: &str| key.to_string(),
        );
        if document.as_object().is_some_and(|map| map.is_empty()) {
            return Ok(base);
        }
        services.merge("system properties", document, base)
    }
}

use crate::error::SourceError;
use crate::schema::Settings;

use super::{Services, Source};

/// Values from command line arguments of the form `name=value`.
///
/// A bare `name` means `name=true`; leading dashes are ignored, so
/// `--app.enabled` and `app.enabled=true` are equivalent.
#[derive(Debug, Clone)]
pub struct CommandLineSource {
    arguments: Vec<(String, String)>,
    prefix: Option<String>,
}

impl CommandLineSource {
    pub fn new<I, S>(args: I, prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefix = prefix.into();
        Self {
            arguments: args.into_iter().filter_map(|a| split_argument(a.as_ref())).collect(),
            prefix: (!prefix.is_empty()).then_some(prefix),
        }
    }
}

fn split_argument(arg: &str) -> Option<(String, String)> {
    let arg = arg.trim_start_matches('-');
    if arg.is_empty() {
        return None;
    }
    Some(match arg.split_once('=') {
        Some((name, value)) => (name.to_string(), value.to_string()),
        None => (arg.to_string(), "true".to_string()),
    })
}

impl<P: Settings> Source<P> for CommandLineSource {
    fn name(&self) -> String {
        "Command line".to_string()
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        let document = services.prepare_properties(
            "Command line",
            self.arguments.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            self.prefix.as_deref(),
            &|key: &str| key.to_string(),
        );
        services.merge("command line", document, base)
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::{DirEntry, WalkDir};

use crate::error::SourceError;
use crate::schema::Settings;

use super::{Services, Source};

/// A mounted secrets tree, such as a Kubernetes secret volume.
///
/// Each directory becomes an object and each file a string value named after
/// the file. Hidden entries are skipped, symbolic links are followed and
/// every visited directory is watched.
#[derive(Debug, Clone)]
pub struct SecretsSource {
    root: PathBuf,
    max_file_size: u64,
    max_files: usize,
    max_depth: usize,
}

impl SecretsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_size: 64 * 1024,
            max_files: 100,
            max_depth: 8,
        }
    }

    /// Files larger than this many bytes are ignored.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// At most this many files are read.
    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    /// Directories nested deeper than this are ignored.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    fn collect<P: Settings>(&self, services: &Services<'_, P>) -> Result<Value, SourceError> {
        let mut root = Map::new();
        let mut files = 0usize;

        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(SourceError::Walk {
                        path: self.root.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    log::trace!("Failed to visit entry: {}", e);
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let names: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();

            if entry.file_type().is_dir() {
                services.watch(entry.path());
                insert_at(&mut root, &names, Value::Object(Map::new()));
                continue;
            }

            if names.is_empty() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
            if size > self.max_file_size {
                log::trace!(
                    "Ignoring {} because it is larger than {} bytes",
                    entry.path().display(),
                    self.max_file_size
                );
                continue;
            }
            files += 1;
            if files > self.max_files {
                log::trace!(
                    "Ignoring {} because more than {} files have been read",
                    entry.path().display(),
                    self.max_files
                );
                continue;
            }
            match read_text(entry.path()) {
                Ok(text) => insert_at(&mut root, &names, Value::String(text)),
                Err(e) => log::trace!("Ignoring {}: {}", entry.path().display(), e),
            }
        }

        Ok(Value::Object(root))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn read_text(path: &Path) -> Result<String, std::io::Error> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Stores `value` at `path`, creating intermediate objects as needed.
fn insert_at(map: &mut Map<String, Value>, path: &[String], value: Value) {
    match path {
        [] => {}
        [name] => {
            map.insert(name.clone(), value);
        }
        [name, rest @ ..] => {
            let slot = map
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_at(child, rest, value);
            }
        }
    }
}

impl<P: Settings> Source<P> for SecretsSource {
    fn name(&self) -> String {
        format!("Secrets ({})", self.root.display())
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        if !self.root.is_dir() {
            log::debug!("Secrets root {} does not exist, skipping", self.root.display());
            return Ok(base);
        }
        let document = self.collect(services)?;
        services.merge(&self.root.display().to_string(), document, base)
    }
}

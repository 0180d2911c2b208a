//! File, directory and embedded document sources.

use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::Format;
use crate::error::SourceError;
use crate::schema::Settings;

use super::{Services, Source};

/// A single file in a known format.
///
/// A missing file is not an error: the source contributes nothing until the
/// file appears. The parent directory is watched so that creation is seen.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: Format,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Picks the format from the file extension.
    pub fn detect(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let format = Format::from_path(&path)?;
        Some(Self::new(path, format))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn watch_parent<P: Settings>(services: &Services<'_, P>, path: &Path) {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if parent.is_dir() {
        services.watch(parent);
    }
}

fn merge_file<P: Settings>(
    services: &Services<'_, P>,
    path: &Path,
    format: Format,
    base: P,
) -> Result<P, SourceError> {
    let bytes = fs::read(path).map_err(|source| SourceError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Merging {} file {}", format.name(), path.display());
    services.merge_bytes(&path.display().to_string(), &bytes, format, base)
}

impl<P: Settings> Source<P> for FileSource {
    fn name(&self) -> String {
        format!("File ({})", self.path.display())
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        watch_parent(services, &self.path);
        if !self.path.is_file() {
            log::debug!("{} does not exist, skipping", self.path.display());
            return Ok(base);
        }
        merge_file(services, &self.path, self.format, base)
    }
}

/// Every matching file directly inside one directory.
///
/// Formats are applied in the order given; within a format, files are taken
/// in name order. A file that fails is logged and the rest still apply.
#[derive(Debug, Clone)]
pub struct DirSource {
    dir: PathBuf,
    formats: Vec<Format>,
}

impl DirSource {
    pub fn new(dir: impl Into<PathBuf>, formats: impl IntoIterator<Item = Format>) -> Self {
        Self {
            dir: dir.into(),
            formats: formats.into_iter().collect(),
        }
    }

    fn list_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let read_error = |source| SourceError::ReadDirectory {
            path: self.dir.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(read_error)? {
            let path = entry.map_err(read_error)?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl<P: Settings> Source<P> for DirSource {
    fn name(&self) -> String {
        format!("Directory ({})", self.dir.display())
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        if !self.dir.is_dir() {
            log::debug!("{} is not a directory, skipping", self.dir.display());
            return Ok(base);
        }
        let files = self.list_files()?;
        services.watch(&self.dir);

        let mut current = base;
        for format in &self.formats {
            for file in files.iter().filter(|f| format.matches(f)) {
                match merge_file(services, file, *format, current.clone()) {
                    Ok(next) => current = next,
                    Err(e) => log::error!("Failed to process file {}: {}", file.display(), e),
                }
            }
        }
        Ok(current)
    }
}

/// A document compiled into the binary, typically via `include_str!`.
///
/// Content that cannot be decoded is logged at debug level and ignored.
#[derive(Debug, Clone)]
pub struct EmbeddedSource {
    name: String,
    content: &'static str,
    format: Format,
}

impl EmbeddedSource {
    pub fn new(name: impl Into<String>, content: &'static str, format: Format) -> Self {
        Self {
            name: name.into(),
            content,
            format,
        }
    }
}

impl<P: Settings> Source<P> for EmbeddedSource {
    fn name(&self) -> String {
        format!("Embedded ({})", self.name)
    }

    fn apply(&self, services: &Services<'_, P>, base: P) -> Result<P, SourceError> {
        let document = match services.codec().decode(self.content.as_bytes(), self.format) {
            Ok(document) => document,
            Err(e) => {
                log::debug!("Unable to read embedded document {}: {}", self.name, e);
                return Ok(base);
            }
        };
        services.merge(&self.name, document, base)
    }
}

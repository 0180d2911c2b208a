use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

/// Programmer errors detected while assembling an aggregator.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("A settings constructor must be supplied before building")]
    MissingConstructor,
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to parse JSON: {0}")]
    ParseJson(#[source] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseToml(#[from] toml::de::Error),

    #[error("Invalid properties content at line {line}: {message}")]
    ParseProperties { line: usize, message: String },

    #[error("Content is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Document root must be an object, found {0}")]
    NotAnObject(String),

    #[error("Failed to convert settings to a document: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to apply merged document to settings: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("Failed to render document as {format}: {message}")]
    Render {
        format: &'static str,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk secrets under '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to process '{origin}': {source}")]
    Codec {
        origin: String,
        #[source]
        source: CodecError,
    },

    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Wraps a codec failure with the name of the document it came from.
    pub fn codec(origin: impl Into<String>, source: CodecError) -> Self {
        SourceError::Codec {
            origin: origin.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("File watching is unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to watch '{path}': {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to spawn watcher thread: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

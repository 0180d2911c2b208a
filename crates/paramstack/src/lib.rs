//! Layered, typed settings.
//!
//! An [`Aggregator`] builds a settings value by running a list of sources in
//! order (files, directories, environment, system properties, command line,
//! secrets) and deep-merging what each contributes. It can watch the files
//! involved and hand the caller a fresh value when the result changes. The
//! [`catalog`] lists every property a settings type accepts, for help output.

pub mod aggregator;
pub mod catalog;
pub mod codec;
pub mod document;
pub mod error;
pub mod problem;
pub mod schema;
pub mod source;
pub mod watcher;

pub use aggregator::{Aggregator, AggregatorBuilder};
pub use catalog::{CatalogOptions, PropertyDescriptor};
pub use codec::{Format, SettingsCodec};
pub use document::{PathSegment, PropertyPath};
pub use error::{BuildError, CodecError, Result, SettingsError, SourceError, WatchError};
pub use problem::{LoggingProblemHandler, MergeProblem, ProblemHandler, ProblemKind};
pub use schema::Settings;
pub use source::{
    CommandLineSource, DirSource, EmbeddedSource, EnvironmentSource, FileSource, FnSource,
    SecretsSource, Services, Source, SystemProperties, SystemPropertiesSource,
};
pub use watcher::{ChangeWatcher, WatchTiming};

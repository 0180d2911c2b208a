//! Ordered aggregation of sources into one settings value.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

use crate::catalog::{self, CatalogOptions, PropertyDescriptor};
use crate::codec::{Format, SettingsCodec};
use crate::error::BuildError;
use crate::problem::{LoggingProblemHandler, ProblemHandler};
use crate::schema::Settings;
use crate::source::{
    CommandLineSource, DirSource, EmbeddedSource, EnvironmentSource, FileSource, SecretsSource,
    Services, Source, SystemProperties, SystemPropertiesSource,
};
use crate::watcher::{ChangeWatcher, WatchTiming};

type Constructor<P> = Box<dyn Fn() -> P + Send + Sync>;
type ChangeHandler<P> = Arc<dyn Fn(P) + Send + Sync>;

/// Assembles an [`Aggregator`].
///
/// Sources run in the order they are added; later sources override scalar
/// values from earlier ones and append to their lists and maps.
pub struct AggregatorBuilder<P> {
    constructor: Option<Constructor<P>>,
    sources: Vec<Box<dyn Source<P>>>,
    problems: Arc<dyn ProblemHandler>,
    timing: WatchTiming,
}

impl<P: Settings> Default for AggregatorBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Settings> AggregatorBuilder<P> {
    pub fn new() -> Self {
        Self {
            constructor: None,
            sources: Vec::new(),
            problems: Arc::new(LoggingProblemHandler),
            timing: WatchTiming::default(),
        }
    }

    /// Produces the starting value for every aggregation pass.
    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.constructor = Some(Box::new(constructor));
        self
    }

    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: Source<P> + 'static,
    {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_problem_handler<H>(mut self, handler: H) -> Self
    where
        H: ProblemHandler + 'static,
    {
        self.problems = Arc::new(handler);
        self
    }

    pub fn with_watch_timing(mut self, timing: WatchTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>, format: Format) -> Self {
        self.with_source(FileSource::new(path, format))
    }

    pub fn with_dir(self, dir: impl Into<PathBuf>, formats: impl IntoIterator<Item = Format>) -> Self {
        self.with_source(DirSource::new(dir, formats))
    }

    pub fn with_embedded(self, name: &str, content: &'static str, format: Format) -> Self {
        self.with_source(EmbeddedSource::new(name, content, format))
    }

    pub fn with_environment(self, prefix: &str) -> Self {
        self.with_source(EnvironmentSource::new(prefix))
    }

    pub fn with_system_properties(self, properties: SystemProperties, prefix: &str) -> Self {
        self.with_source(SystemPropertiesSource::new(properties, prefix))
    }

    pub fn with_command_line<I, S>(self, args: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_source(CommandLineSource::new(args, prefix))
    }

    pub fn with_secrets(self, source: SecretsSource) -> Self {
        self.with_source(source)
    }

    pub fn build(self) -> Result<Aggregator<P>, BuildError> {
        let constructor = self.constructor.ok_or(BuildError::MissingConstructor)?;
        Ok(Aggregator {
            inner: Arc::new(Inner {
                constructor,
                sources: self.sources,
                problems: self.problems,
                codec: SettingsCodec::new(),
                watcher: ChangeWatcher::new(self.timing),
                generations: AtomicU64::new(0),
                snapshot: Mutex::new(Snapshot::default()),
                handler: Mutex::new(None),
                reacting: Mutex::new(()),
            }),
        })
    }
}

/// Outcome of offering a freshly gathered document to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    /// A later pass has already been recorded; the offer is discarded.
    Stale,
    Unchanged,
    Changed,
}

/// Last gathered document, tagged with the pass that produced it.
#[derive(Debug, Default)]
struct Snapshot {
    generation: u64,
    document: Option<Value>,
}

impl Snapshot {
    fn offer(&mut self, generation: u64, document: Option<Value>) -> Offer {
        if generation < self.generation {
            return Offer::Stale;
        }
        self.generation = generation;
        if self.document == document {
            return Offer::Unchanged;
        }
        self.document = document;
        Offer::Changed
    }
}

struct Inner<P> {
    constructor: Constructor<P>,
    sources: Vec<Box<dyn Source<P>>>,
    problems: Arc<dyn ProblemHandler>,
    codec: SettingsCodec<P>,
    watcher: ChangeWatcher,
    /// Numbers aggregation passes in the order they start.
    generations: AtomicU64,
    snapshot: Mutex<Snapshot>,
    handler: Mutex<Option<ChangeHandler<P>>>,
    /// Serialises change reactions, including the handler call.
    reacting: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: Settings> Inner<P> {
    fn run_sources(&self) -> P {
        let services = Services::new(&self.codec, self.problems.as_ref(), &self.watcher);
        let mut current = (self.constructor)();
        for source in &self.sources {
            match source.apply(&services, current.clone()) {
                Ok(next) => {
                    tracing::trace!(source = %source.name(), "Applied source");
                    current = next;
                }
                Err(e) => {
                    tracing::error!(source = %source.name(), error = %e, "Failed to gather parameters");
                }
            }
        }
        current
    }

    fn document_of(&self, settings: &P) -> Option<Value> {
        match self.codec.to_document(settings) {
            Ok(document) => Some(document),
            Err(e) => {
                log::warn!("Unable to take a snapshot of the settings: {}", e);
                None
            }
        }
    }

    /// Runs the sources and offers the result to the snapshot. A pass that
    /// finishes after a later one leaves the snapshot alone.
    fn aggregate(&self) -> (P, Offer) {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let settings = self.run_sources();
        let document = self.document_of(&settings);
        let offer = lock(&self.snapshot).offer(generation, document);
        (settings, offer)
    }

    fn gather(&self) -> P {
        self.aggregate().0
    }

    fn react(&self) {
        let Some(handler) = lock(&self.handler).clone() else {
            return;
        };
        let _reacting = lock(&self.reacting);

        let (settings, offer) = self.aggregate();
        match offer {
            Offer::Stale => {
                tracing::debug!("A newer gather superseded this reaction");
                return;
            }
            Offer::Unchanged => {
                tracing::debug!("Settings unchanged after file system activity");
                return;
            }
            Offer::Changed => {}
        }

        tracing::info!("Settings changed, notifying");
        handler(settings);
    }
}

/// Runs the registered sources and tracks the result for change detection.
///
/// Cloning is cheap; clones share sources, watcher and snapshot.
pub struct Aggregator<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for Aggregator<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Settings> Aggregator<P> {
    pub fn builder() -> AggregatorBuilder<P> {
        AggregatorBuilder::new()
    }

    /// Builds a fresh settings value and applies every source in order.
    ///
    /// A failing source is logged and skipped; the value from before it is
    /// carried on to the next source.
    pub fn gather(&self) -> P {
        self.inner.gather()
    }

    /// Calls `handler` with freshly gathered settings whenever watched files
    /// change and the result differs from the last gathered value.
    ///
    /// Returns `false` when no source registered anything to watch (static
    /// configuration), when watching is unavailable, or after
    /// [`Aggregator::stop_watching`].
    pub fn notify_of_changes<F>(&self, handler: F) -> bool
    where
        F: Fn(P) + Send + Sync + 'static,
    {
        *lock(&self.inner.handler) = Some(Arc::new(handler));
        let weak: Weak<Inner<P>> = Arc::downgrade(&self.inner);
        self.inner.watcher.start(move || {
            if let Some(inner) = weak.upgrade() {
                inner.react();
            }
        })
    }

    pub fn stop_watching(&self) {
        self.inner.watcher.stop();
    }

    /// Document form of the most recently gathered settings.
    pub fn last_snapshot(&self) -> Option<Value> {
        lock(&self.inner.snapshot).document.clone()
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.inner.watcher
    }

    /// Lists every settable property of `P`, with defaults taken from
    /// `default`.
    pub fn documentation(&self, default: &P, options: &CatalogOptions) -> Vec<PropertyDescriptor> {
        catalog::walk(default, options)
    }
}

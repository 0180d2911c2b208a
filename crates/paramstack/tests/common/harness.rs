//! Test harness for isolated test execution.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use tempfile::TempDir;

use paramstack::{MergeProblem, WatchTiming};

static LOGGING: Once = Once::new();

/// Routes `log` and `tracing` output to the test writer. Set `RUST_LOG` to
/// see it.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let _ = tracing_log::LogTracer::init();
    });
}

/// Watch timing short enough for tests.
pub fn fast_timing() -> WatchTiming {
    WatchTiming {
        settle: Duration::from_millis(200),
        idle: Duration::from_secs(1),
    }
}

/// Isolated directories for configuration files and secrets.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Directory for configuration files.
    pub config_dir: PathBuf,
    /// Root of the secrets tree.
    pub secrets_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        init_logging();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_dir = temp_dir.path().join("config");
        let secrets_dir = temp_dir.path().join("secrets");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");
        std::fs::create_dir_all(&secrets_dir).expect("Failed to create secrets dir");
        Self {
            temp_dir,
            config_dir,
            secrets_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a file into the config directory.
    pub fn write_config(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.config_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write config file");
        path
    }

    /// Writes a secret, creating intermediate directories.
    pub fn write_secret(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.secrets_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create secret dir");
        }
        std::fs::write(&path, content).expect("Failed to write secret");
        path
    }
}

/// Problem handler that records what it is given.
#[derive(Clone, Default)]
pub struct CollectingProblems {
    seen: Arc<Mutex<Vec<MergeProblem>>>,
}

impl CollectingProblems {
    pub fn handler(&self) -> impl Fn(&MergeProblem) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |problem: &MergeProblem| seen.lock().unwrap().push(problem.clone())
    }

    pub fn problems(&self) -> Vec<MergeProblem> {
        self.seen.lock().unwrap().clone()
    }
}

//! Debounced file system watcher that drives re-aggregation.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::WatchError;

/// Timing of the debounce loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    /// Quiet period after the last event before the callback fires.
    pub settle: Duration,
    /// Poll interval while nothing is pending.
    pub idle: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(2),
            idle: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    NotificationPending,
}

/// What woke the worker up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceInput {
    Activity,
    Timeout,
}

/// Result of one debounce step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceStep {
    pub state: DebounceState,
    /// How long to wait for the next event.
    pub wait: Duration,
    /// Whether the change callback should run now.
    pub fire: bool,
}

/// Advances the debounce state machine.
///
/// Activity always (re)arms the settle timer; a timeout fires only when a
/// notification is pending.
pub fn debounce_step(
    state: DebounceState,
    input: DebounceInput,
    timing: &WatchTiming,
) -> DebounceStep {
    match input {
        DebounceInput::Activity => DebounceStep {
            state: DebounceState::NotificationPending,
            wait: timing.settle,
            fire: false,
        },
        DebounceInput::Timeout => DebounceStep {
            state: DebounceState::Idle,
            wait: timing.idle,
            fire: state == DebounceState::NotificationPending,
        },
    }
}

enum Signal {
    Fs(notify::Result<Event>),
    Stop,
}

enum Backend {
    NotCreated,
    Ready(RecommendedWatcher),
    Disabled,
}

struct State {
    backend: Backend,
    paths: HashSet<PathBuf>,
    handle: Option<JoinHandle<()>>,
    stopped: bool,
}

/// Watches registered directories and calls back once activity settles.
///
/// Paths are only ever added. The background worker starts at most once and
/// runs until [`ChangeWatcher::stop`] or drop.
pub struct ChangeWatcher {
    timing: WatchTiming,
    state: Mutex<State>,
    sender: Sender<Signal>,
    receiver: Receiver<Signal>,
    running: Arc<AtomicBool>,
}

impl ChangeWatcher {
    pub fn new(timing: WatchTiming) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            timing,
            state: Mutex::new(State {
                backend: Backend::NotCreated,
                paths: HashSet::new(),
                handle: None,
                stopped: false,
            }),
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn timing(&self) -> WatchTiming {
        self.timing
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `path` (non-recursively). Registering a path twice is a no-op.
    pub fn watch(&self, path: &Path) -> Result<(), WatchError> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut state = self.lock();
        if state.paths.contains(&path) {
            return Ok(());
        }

        if matches!(state.backend, Backend::NotCreated) {
            let sender = self.sender.clone();
            state.backend = match notify::recommended_watcher(move |event| {
                let _ = sender.send(Signal::Fs(event));
            }) {
                Ok(watcher) => Backend::Ready(watcher),
                Err(e) => {
                    log::warn!("File watching disabled: {}", e);
                    Backend::Disabled
                }
            };
        }

        let Backend::Ready(watcher) = &mut state.backend else {
            return Err(WatchError::Unavailable(
                "no file system watcher could be created".to_string(),
            ));
        };
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Register {
                path: path.clone(),
                source,
            })?;

        log::debug!("Watching {}", path.display());
        state.paths.insert(path);
        Ok(())
    }

    /// Registered paths, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.lock().paths.iter().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the background worker.
    ///
    /// Returns `false` when nothing is being watched, the worker was stopped,
    /// or the thread could not be spawned. Once started, further calls return
    /// `true` without starting anything.
    pub fn start<F>(&self, on_change: F) -> bool
    where
        F: Fn() + Send + 'static,
    {
        let mut state = self.lock();
        if state.stopped {
            log::debug!("Change watcher has been stopped and will not restart");
            return false;
        }
        if state.handle.is_some() {
            return true;
        }
        if state.paths.is_empty() {
            log::debug!("No paths registered, change watcher not started");
            return false;
        }

        // Events queued before the start are changes made since registration.
        let receiver = self.receiver.clone();
        let running = Arc::clone(&self.running);
        let timing = self.timing;
        running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("paramstack-watcher".to_string())
            .spawn(move || {
                run_loop(&receiver, &timing, &on_change);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(WatchError::SpawnFailed);

        match spawned {
            Ok(handle) => {
                log::info!("Started watching {} path(s) for changes", state.paths.len());
                state.handle = Some(handle);
                true
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                log::error!("{}", e);
                false
            }
        }
    }

    /// Stops the worker and waits for it to finish, unless called from the
    /// worker itself.
    pub fn stop(&self) {
        let handle = {
            let mut state = self.lock();
            state.stopped = true;
            state.handle.take()
        };
        let Some(handle) = handle else {
            return;
        };
        let _ = self.sender.send(Signal::Stop);
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("Change watcher thread panicked");
        }
        log::info!("Stopped watching for changes");
    }

    #[cfg(test)]
    fn inject(&self, event: Event) {
        let _ = self.sender.send(Signal::Fs(Ok(event)));
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn run_loop(receiver: &Receiver<Signal>, timing: &WatchTiming, on_change: &dyn Fn()) {
    let mut state = DebounceState::Idle;
    let mut wait = timing.idle;

    loop {
        let input = match receiver.recv_timeout(wait) {
            Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Signal::Fs(Ok(event))) => {
                if !is_relevant(&event.kind) {
                    continue;
                }
                log::trace!("File system event {:?} on {:?}", event.kind, event.paths);
                DebounceInput::Activity
            }
            Ok(Signal::Fs(Err(e))) => {
                log::warn!("Watch error: {}", e);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => DebounceInput::Timeout,
        };

        let step = debounce_step(state, input, timing);
        state = step.state;
        wait = step.wait;
        if step.fire {
            log::debug!("File system activity settled, notifying");
            if catch_unwind(AssertUnwindSafe(|| on_change())).is_err() {
                log::error!("Change callback panicked");
            }
        }
    }
}

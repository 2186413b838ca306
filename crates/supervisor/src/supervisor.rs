//! Process supervisor
//!
//! Registry of managed workers keyed by config key. One mutex guards the
//! registry and is held for the whole of start (including the crash probe) and
//! stop (including the kill sequence), so operations on the registry are
//! strictly serialized.

use crossbeam_channel::{Sender, select, tick};
use helm_clock::SystemClock;
use helm_core::{Clock, ConfigKey, ProcessState, StopMethod, StrategyKind, Timestamp};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::launcher::{ProcessLauncher, SystemLauncher};
use crate::observer::{ObserverHub, SupervisorObserver};
use crate::process::{self, ManagedProcess, ProcessStatus, StopPolicy};
use crate::resolver::ConfigResolver;

/// Successful start()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub key: ConfigKey,
    pub pid: u32,
    pub strategy: StrategyKind,
}

/// Successful stop()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stopped {
    pub key: ConfigKey,
    pub pid: u32,
    pub method: StopMethod,
    /// False if the process could not be confirmed dead (entry removed anyway)
    pub confirmed: bool,
    pub message: String,
}

/// Aggregate of stop_all()
#[derive(Debug)]
pub struct StopAllReport {
    pub stopped_count: usize,
    pub results: Vec<(ConfigKey, Result<Stopped, SupervisorError>)>,
}

/// What one reaper sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Entries newly found dead without a stop()
    pub crashed: Vec<ConfigKey>,
    /// Entries removed after the retention window
    pub purged: Vec<ConfigKey>,
}

struct Inner {
    config: SupervisorConfig,
    resolver: Arc<dyn ConfigResolver>,
    launcher: Arc<dyn ProcessLauncher>,
    clock: Arc<dyn Clock>,
    observer: Arc<ObserverHub>,
    registry: Mutex<HashMap<ConfigKey, ManagedProcess>>,
}

struct Reaper {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Builder for [`ProcessSupervisor`]
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    resolver: Arc<dyn ConfigResolver>,
    launcher: Arc<dyn ProcessLauncher>,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn SupervisorObserver>>,
    reaper: bool,
}

impl SupervisorBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SupervisorObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Skip the background reaper; sweeps then only happen through `reap_now`
    pub fn without_reaper(mut self) -> Self {
        self.reaper = false;
        self
    }

    pub fn build(self) -> ProcessSupervisor {
        let inner = Arc::new(Inner {
            config: self.config,
            resolver: self.resolver,
            launcher: self.launcher,
            clock: self.clock,
            observer: Arc::new(ObserverHub::new(self.observer)),
            registry: Mutex::new(HashMap::new()),
        });

        let reaper = if self.reaper {
            spawn_reaper(Arc::clone(&inner))
        } else {
            None
        };

        ProcessSupervisor { inner, reaper }
    }
}

/// Spawns, tracks and stops strategy workers
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
    reaper: Option<Reaper>,
}

impl ProcessSupervisor {
    /// Supervisor on the wall clock, with a background reaper and no observer
    pub fn new(config: SupervisorConfig, resolver: Arc<dyn ConfigResolver>) -> Self {
        Self::builder(config, resolver).build()
    }

    pub fn builder(config: SupervisorConfig, resolver: Arc<dyn ConfigResolver>) -> SupervisorBuilder {
        SupervisorBuilder {
            config,
            resolver,
            launcher: Arc::new(SystemLauncher),
            clock: Arc::new(SystemClock::new()),
            observer: None,
            reaper: true,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Launch the worker for `key`
    ///
    /// Fails with AlreadyRunning if a live worker is tracked under the key; a
    /// dead entry is replaced. A worker that exits within the crash-probe window
    /// is reported as SpawnFailure with its (truncated) output and not retried.
    pub fn start(&self, key: &str) -> Result<Started, SupervisorError> {
        let inner = &self.inner;
        let key = ConfigKey::new(key);
        let mut registry = inner.registry.lock();

        if let Some(existing) = registry.get_mut(key.as_str()) {
            if existing.is_alive() {
                return Err(SupervisorError::AlreadyRunning {
                    pid: existing.pid(),
                    key,
                });
            }
            debug!("[{}] Replacing dead entry (PID {})", key, existing.pid());
            registry.remove(key.as_str());
        }

        let spec = inner
            .resolver
            .resolve(&key)
            .map_err(|source| SupervisorError::ConfigResolution {
                key: key.clone(),
                source,
            })?;
        info!(
            "[{}] Starting {} worker: {}",
            key,
            spec.strategy,
            spec.command_line()
        );

        let (mut child, mut output) =
            inner.launcher.launch(&spec).map_err(|e| SupervisorError::SpawnFailure {
                key: key.clone(),
                output: e.to_string(),
            })?;
        let started_at = inner.clock.now();

        thread::sleep(inner.config.crash_probe());
        if let Ok(Some(status)) = child.try_wait() {
            let limit = inner.config.spawn_output_limit;
            let captured = process::read_available(&mut output, limit);
            warn!("[{}] Worker crashed immediately ({})", key, status);
            let output = if captured.is_empty() {
                format!("crashed immediately with no output ({})", status)
            } else {
                captured
            };
            return Err(SupervisorError::SpawnFailure { key, output });
        }

        let mut process = ManagedProcess::new(
            key.clone(),
            spec.strategy,
            child,
            output,
            started_at,
            inner.config.log_capacity,
            Arc::clone(&inner.observer),
        );
        process.transition(ProcessState::Running);
        let pid = process.pid();
        registry.insert(key.clone(), process);
        info!("[{}] Started {} worker (PID {})", key, spec.strategy, pid);
        inner.observer.status(&key, ProcessState::Running, pid);

        Ok(Started {
            key,
            pid,
            strategy: spec.strategy,
        })
    }

    /// Stop the worker for `key`
    ///
    /// The entry is always removed, even when the kill cannot be confirmed.
    pub fn stop(&self, key: &str, force: bool) -> Result<Stopped, SupervisorError> {
        let inner = &self.inner;
        let mut registry = inner.registry.lock();

        let Some(process) = registry.get_mut(key) else {
            return Err(SupervisorError::NotFound(ConfigKey::new(key)));
        };
        let key = process.key().clone();
        let pid = process.pid();

        if !process.is_alive() {
            if let Some(process) = registry.remove(key.as_str()) {
                process.stop_log_capture();
            }
            info!("[{}] Worker was already stopped (PID {})", key, pid);
            return Ok(Stopped {
                message: format!("Worker for {} was already stopped", key),
                key,
                pid,
                method: StopMethod::AlreadyExited,
                confirmed: true,
            });
        }

        process.transition(ProcessState::Stopping);
        inner.observer.status(&key, ProcessState::Stopping, pid);

        let policy = StopPolicy {
            graceful: inner.config.graceful_stop(),
            forceful: inner.config.forceful_stop(),
            last_resort_grace: inner.config.last_resort_grace(),
        };
        let outcome = process.terminate(&policy, force);

        if let Some(mut process) = registry.remove(key.as_str()) {
            process.transition(ProcessState::Stopped);
        }
        if !outcome.confirmed {
            warn!(
                "[{}] Could not confirm PID {} is dead; dropping it from tracking anyway",
                key, pid
            );
        }
        inner.observer.status(&key, ProcessState::Stopped, pid);

        let message = format!("Stopped worker for {} (PID {}) via {}", key, pid, outcome.method);
        info!("[{}] {}", key, message);
        Ok(Stopped {
            key,
            pid,
            method: outcome.method,
            confirmed: outcome.confirmed,
            message,
        })
    }

    /// Status of one worker; an exit found here is recorded as a crash
    pub fn status(&self, key: &str) -> Result<ProcessStatus, SupervisorError> {
        let now = self.inner.clock.now();
        let mut registry = self.inner.registry.lock();
        let process = registry
            .get_mut(key)
            .ok_or_else(|| SupervisorError::NotFound(ConfigKey::new(key)))?;
        self.inner.detect_crash(process, now);
        Ok(process.status(now))
    }

    /// Status of every tracked worker, sorted by key
    pub fn status_all(&self) -> Vec<ProcessStatus> {
        let now = self.inner.clock.now();
        let mut statuses: Vec<ProcessStatus> = self
            .inner
            .registry
            .lock()
            .values_mut()
            .map(|process| {
                self.inner.detect_crash(process, now);
                process.status(now)
            })
            .collect();
        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        statuses
    }

    /// Last `n` captured log lines for `key`, oldest first
    pub fn logs(&self, key: &str, n: usize) -> Result<Vec<String>, SupervisorError> {
        self.inner
            .registry
            .lock()
            .get(key)
            .map(|process| process.logs(n))
            .ok_or_else(|| SupervisorError::NotFound(ConfigKey::new(key)))
    }

    /// Stop every tracked worker; one failure never prevents the others
    pub fn stop_all(&self) -> StopAllReport {
        let mut keys: Vec<ConfigKey> = self.inner.registry.lock().keys().cloned().collect();
        keys.sort();

        let results: Vec<(ConfigKey, Result<Stopped, SupervisorError>)> = keys
            .into_iter()
            .map(|key| {
                let result = self.stop(key.as_str(), false);
                (key, result)
            })
            .collect();
        let stopped_count = results.iter().filter(|(_, r)| r.is_ok()).count();

        info!("Stopped {}/{} workers", stopped_count, results.len());
        StopAllReport {
            stopped_count,
            results,
        }
    }

    /// Run one reaper sweep now
    pub fn reap_now(&self) -> ReapReport {
        self.inner.reap()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Observer callbacks that panicked so far
    pub fn observer_panics(&self) -> u64 {
        self.inner.observer.panics()
    }
}

impl Inner {
    /// Mark a newly dead worker Crashed and announce it, once per worker
    fn detect_crash(&self, process: &mut ManagedProcess, now: Timestamp) -> bool {
        let Some(status) = process.detect_crash(now) else {
            return false;
        };
        warn!(
            "[{}] Worker exited unexpectedly (PID {}, {})",
            process.key(),
            process.pid(),
            status
        );
        self.observer
            .status(process.key(), ProcessState::Crashed, process.pid());
        true
    }

    fn reap(&self) -> ReapReport {
        let now = self.clock.now();
        let retention =
            chrono::Duration::from_std(self.config.dead_retention()).unwrap_or(chrono::Duration::MAX);
        let mut report = ReapReport::default();
        let mut registry = self.registry.lock();

        for (key, process) in registry.iter_mut() {
            if self.detect_crash(process, now) {
                report.crashed.push(key.clone());
            } else if process.died_at().is_some_and(|died_at| now - died_at >= retention) {
                report.purged.push(key.clone());
            }
        }

        for key in &report.purged {
            if let Some(process) = registry.remove(key.as_str()) {
                process.stop_log_capture();
                info!("[{}] Purged dead worker (PID {})", key, process.pid());
            }
        }
        report.crashed.sort();
        report.purged.sort();
        report
    }
}

fn spawn_reaper(inner: Arc<Inner>) -> Option<Reaper> {
    let interval = inner.config.reap_interval();
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

    let spawned = thread::Builder::new()
        .name("supervisor-reaper".to_string())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(shutdown_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if catch_unwind(AssertUnwindSafe(|| inner.reap())).is_err() {
                            error!("Reaper sweep panicked");
                        }
                    }
                }
            }
            debug!("Reaper stopped");
        });

    match spawned {
        Ok(thread) => Some(Reaper {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }),
        Err(e) => {
            error!("Could not start reaper thread: {}", e);
            None
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Some(reaper) = &mut self.reaper {
            // Disconnecting the channel wakes the reaper's select
            reaper.shutdown.take();
            if let Some(thread) = reaper.thread.take() {
                let _ = thread.join();
            }
        }
        let tracked = self.inner.registry.lock().len();
        if tracked > 0 {
            warn!(
                "Supervisor dropped with {} tracked worker(s) still running; call stop_all() first",
                tracked
            );
        }
    }
}

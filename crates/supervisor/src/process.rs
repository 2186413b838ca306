//! One supervised worker process
//!
//! A `ManagedProcess` exclusively owns its child handle: only it signals, waits
//! on or reaps the process. Worker stdout and stderr share one pipe, drained by
//! a dedicated thread into a bounded ring buffer.

use chrono::Local;
use helm_core::{ConfigKey, ProcessState, StopMethod, StrategyKind, Timestamp};
use helm_sync::RingBuffer;
use log::{debug, error, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, PipeReader, Read};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::launcher::WorkerHandle;
use crate::observer::ObserverHub;

/// Drain thread re-checks its stop flag at least this often
const LOG_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Step between exit checks while waiting for a signaled child
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pause after the second last-resort kill(2)
const FINAL_KILL_GRACE: Duration = Duration::from_millis(200);

/// Timeouts applied by [`ManagedProcess::terminate`]
#[derive(Debug, Clone, Copy)]
pub struct StopPolicy {
    pub graceful: Duration,
    pub forceful: Duration,
    pub last_resort_grace: Duration,
}

/// Result of the kill sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub method: StopMethod,
    /// False when the process still looked alive after every step
    pub confirmed: bool,
}

/// Read-only view of one tracked worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStatus {
    pub key: ConfigKey,
    pub pid: u32,
    pub strategy: StrategyKind,
    pub state: ProcessState,
    pub alive: bool,
    pub exit_code: Option<i32>,
    pub started_at: Timestamp,
    pub died_at: Option<Timestamp>,
    pub uptime_seconds: u64,
    pub uptime: String,
}

/// Read whatever output is already buffered in the pipe, without blocking on writers
pub(crate) fn read_available(reader: &mut PipeReader, limit: usize) -> String {
    let mut output = Vec::new();
    let mut buf = [0u8; 4096];
    while output.len() < limit.saturating_mul(4) {
        match wait_readable(reader, Duration::from_millis(10)) {
            Ok(true) => {}
            Ok(false) | Err(_) => break,
        }
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    truncate_chars(String::from_utf8_lossy(&output).trim(), limit)
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Human uptime: `42s`, `3m 7s`, `2h 5m`
pub fn format_uptime(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

pub struct ManagedProcess {
    key: ConfigKey,
    strategy: StrategyKind,
    child: Box<dyn WorkerHandle>,
    pid: u32,
    state: ProcessState,
    started_at: Timestamp,
    died_at: Option<Timestamp>,
    logs: Arc<Mutex<RingBuffer<String>>>,
    stop_logging: Arc<AtomicBool>,
    drain: Option<JoinHandle<()>>,
}

impl ManagedProcess {
    /// Take ownership of a child that survived the crash probe and start draining its output
    pub(crate) fn new(
        key: ConfigKey,
        strategy: StrategyKind,
        child: Box<dyn WorkerHandle>,
        output: PipeReader,
        started_at: Timestamp,
        log_capacity: usize,
        observer: Arc<ObserverHub>,
    ) -> Self {
        let pid = child.pid();
        let logs = Arc::new(Mutex::new(RingBuffer::new(log_capacity)));
        let stop_logging = Arc::new(AtomicBool::new(false));

        let drain = {
            let key = key.clone();
            let logs = Arc::clone(&logs);
            let stop = Arc::clone(&stop_logging);
            thread::Builder::new()
                .name(format!("log-drain-{}", pid))
                .spawn(move || {
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        drain_output(output, &key, &logs, &stop, &observer)
                    }));
                    if result.is_err() {
                        error!("[{}] Log drain thread panicked", key);
                    }
                })
        };
        let drain = match drain {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("[{}] Could not start log capture: {}", key, e);
                None
            }
        };

        Self {
            key,
            strategy,
            child,
            pid,
            state: ProcessState::Starting,
            started_at,
            died_at: None,
            logs,
            stop_logging,
            drain,
        }
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Time the process was first seen dead by a sweep or status query
    pub fn died_at(&self) -> Option<Timestamp> {
        self.died_at
    }

    /// Exit status if the process has exited; reaps it if needed
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().unwrap_or_else(|e| {
            debug!("[{}] try_wait failed: {}", self.key, e);
            None
        })
    }

    /// Liveness, derived from the child handle on every call
    pub fn is_alive(&mut self) -> bool {
        self.exit_status().is_none()
    }

    /// Move to `next`, logging (and applying) an out-of-order transition
    pub(crate) fn transition(&mut self, next: ProcessState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "[{}] Unexpected state transition {} -> {}",
                self.key, self.state, next
            );
        }
        self.state = next;
    }

    /// Record an exit nobody asked for
    ///
    /// Returns the exit status the first time the process is seen dead; later
    /// calls, and calls on a live process, return None.
    pub(crate) fn detect_crash(&mut self, now: Timestamp) -> Option<ExitStatus> {
        if self.died_at.is_some() {
            return None;
        }
        let status = self.exit_status()?;
        self.transition(ProcessState::Crashed);
        self.died_at = Some(now);
        Some(status)
    }

    /// Seconds since start, frozen at the detected death time
    pub fn uptime_seconds(&self, now: Timestamp) -> u64 {
        let end = self.died_at.unwrap_or(now);
        (end - self.started_at).num_seconds().max(0) as u64
    }

    /// Last `n` captured lines, oldest first
    pub fn logs(&self, n: usize) -> Vec<String> {
        self.logs.lock().last(n)
    }

    pub fn status(&mut self, now: Timestamp) -> ProcessStatus {
        let exit = self.exit_status();
        let uptime_seconds = self.uptime_seconds(now);
        ProcessStatus {
            key: self.key.clone(),
            pid: self.pid,
            strategy: self.strategy,
            state: self.state,
            alive: exit.is_none(),
            exit_code: exit.and_then(|status| status.code()),
            started_at: self.started_at,
            died_at: self.died_at,
            uptime_seconds,
            uptime: format_uptime(uptime_seconds),
        }
    }

    /// Ask the drain thread to release the pipe; it exits within one poll interval
    pub(crate) fn stop_log_capture(&self) {
        self.stop_logging.store(true, Ordering::SeqCst);
    }

    /// Kill sequence: SIGTERM, then SIGKILL through the handle, then a direct kill(2)
    ///
    /// `force` skips the SIGTERM phase. Log capture is stopped first.
    pub(crate) fn terminate(&mut self, policy: &StopPolicy, force: bool) -> StopOutcome {
        self.stop_log_capture();

        if !force {
            if let Err(e) = self.child.terminate() {
                debug!("[{}] SIGTERM to PID {} failed: {}", self.key, self.pid, e);
            }
            if self.wait_exit(policy.graceful) {
                return self.finish(StopMethod::Graceful, true);
            }
            warn!(
                "[{}] SIGTERM didn't stop PID {} within {}ms, sending SIGKILL",
                self.key,
                self.pid,
                policy.graceful.as_millis()
            );
        }

        if let Err(e) = self.child.kill() {
            debug!("[{}] kill via handle failed: {}", self.key, e);
        }
        if self.wait_exit(policy.forceful) {
            return self.finish(StopMethod::Forced, true);
        }

        warn!(
            "[{}] PID {} still alive after SIGKILL, trying kill(2)",
            self.key, self.pid
        );
        if let Err(e) = self.child.kill_pid() {
            debug!("[{}] kill(2) on PID {} failed: {}", self.key, self.pid, e);
        }
        thread::sleep(policy.last_resort_grace);
        if self.is_alive() {
            let _ = self.child.kill_pid();
            thread::sleep(FINAL_KILL_GRACE);
        }
        let confirmed = !self.is_alive();
        self.finish(StopMethod::LastResort, confirmed)
    }

    fn finish(&mut self, method: StopMethod, confirmed: bool) -> StopOutcome {
        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
        StopOutcome { method, confirmed }
    }

    fn wait_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // Detach the drain thread; it notices the flag within one poll interval
        self.stop_log_capture();
    }
}

fn drain_output(
    mut reader: PipeReader,
    key: &ConfigKey,
    logs: &Mutex<RingBuffer<String>>,
    stop: &AtomicBool,
    observer: &ObserverHub,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    let emit = |raw: &[u8]| {
        let text = String::from_utf8_lossy(raw);
        let line = format!(
            "[{}] {}",
            Local::now().format("%H:%M:%S"),
            text.trim_end_matches(['\r', '\n'])
        );
        logs.lock().push(line.clone());
        observer.log_line(key, &line);
    };

    while !stop.load(Ordering::SeqCst) {
        match wait_readable(&reader, LOG_POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                emit(format!("[ERROR] Log capture failed: {}", e).as_bytes());
                break;
            }
        }

        match reader.read(&mut buf) {
            // All writers closed: the worker and anything it spawned are gone
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    emit(&line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                emit(format!("[ERROR] Log capture failed: {}", e).as_bytes());
                break;
            }
        }
    }

    if !pending.is_empty() {
        emit(&pending);
    }
    debug!("[{}] Log capture finished", key);
}

/// Wait up to `timeout` for the pipe to become readable (data or hang-up)
#[cfg(unix)]
fn wait_readable(reader: &PipeReader, timeout: Duration) -> io::Result<bool> {
    use std::os::fd::AsRawFd;

    let mut fds = libc::pollfd {
        fd: reader.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    // SAFETY: `fds` is a valid pollfd for the duration of the call and nfds is 1
    let rc = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0)
}

/// Without poll(2) the drain falls back to blocking reads
#[cfg(not(unix))]
fn wait_readable(_reader: &PipeReader, _timeout: Duration) -> io::Result<bool> {
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::spawn;
    use crate::resolver::LaunchSpec;

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(187), "3m 7s");
        assert_eq!(format_uptime(3600), "1h 0m");
        assert_eq!(format_uptime(7500), "2h 5m");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars(&"x".repeat(600), 500).len(), 500);
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_combines_streams() {
        let spec = LaunchSpec::new("/bin/sh", StrategyKind::Grid)
            .args(["-c", "echo out; echo err >&2; echo $PYTHONUNBUFFERED"]);
        let (mut child, mut reader) = spawn(&spec).unwrap();
        child.wait().unwrap();

        let output = read_available(&mut reader, 500);
        assert_eq!(output, "out\nerr\n1");
    }

    #[cfg(unix)]
    #[test]
    fn test_drain_prefixes_and_caps() {
        let spec = LaunchSpec::new("/bin/sh", StrategyKind::Spot)
            .args(["-c", "for i in 1 2 3 4 5; do echo line $i; done"]);
        let (mut child, reader) = spawn(&spec).unwrap();
        child.wait().unwrap();

        let logs = Mutex::new(RingBuffer::new(3));
        let stop = AtomicBool::new(false);
        drain_output(reader, &ConfigKey::new("k"), &logs, &stop, &ObserverHub::default());

        let lines = logs.lock().last(10);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("] line 3"));
        assert!(lines[2].ends_with("] line 5"));
        // [HH:MM:SS] prefix
        assert_eq!(lines[0].as_bytes()[0], b'[');
        assert_eq!(lines[0].as_bytes()[9], b']');
    }
}

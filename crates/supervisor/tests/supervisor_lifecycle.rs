//! Integration test: ProcessSupervisor <-> real /bin/sh workers
//!
//! Covers the full lifecycle: start, crash probe, log capture, escalating
//! stop, and reaping of workers that die on their own.

#![cfg(unix)]

use helm_clock::ManualClock;
use helm_core::{ProcessState, StopMethod, StrategyKind};
use helm_supervisor::{
    ChannelObserver, LaunchSpec, ProcessLauncher, ProcessSupervisor, ReapReport, StaticResolver,
    SupervisorConfig, SupervisorError, SupervisorEvent, WorkerHandle,
};
use std::io::{self, PipeReader};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Exits one second after SIGTERM
const GRACEFUL_WORKER: &str = "trap 'sleep 1; exit 0' TERM; while true; do sleep 0.1; done";

/// Ignores SIGTERM entirely
const STUBBORN_WORKER: &str = "trap '' TERM; while true; do sleep 0.1; done";

fn sh(script: &str, strategy: StrategyKind) -> LaunchSpec {
    LaunchSpec::new("/bin/sh", strategy).args(["-c", script])
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        crash_probe_ms: 200,
        graceful_stop_ms: 3_000,
        forceful_stop_ms: 2_000,
        ..Default::default()
    }
}

fn supervisor(resolver: StaticResolver, config: SupervisorConfig) -> ProcessSupervisor {
    let _ = env_logger::builder().is_test(true).try_init();
    ProcessSupervisor::builder(config, Arc::new(resolver))
        .without_reaper()
        .build()
}

fn wait_until(what: &str, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_grid_worker_start_status_graceful_stop() {
    let (observer, events) = ChannelObserver::new();
    let resolver = StaticResolver::new().with("a", sh(GRACEFUL_WORKER, StrategyKind::Grid));
    let supervisor = ProcessSupervisor::builder(SupervisorConfig::default(), Arc::new(resolver))
        .observer(Arc::new(observer))
        .without_reaper()
        .build();

    let started = supervisor.start("a").unwrap();
    assert_eq!(started.strategy, StrategyKind::Grid);

    let all = supervisor.status_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].key.as_str(), "a");
    assert_eq!(all[0].strategy, StrategyKind::Grid);
    assert_eq!(all[0].state, ProcessState::Running);
    assert_eq!(all[0].pid, started.pid);
    assert!(all[0].alive);

    let stopped = supervisor.stop("a", false).unwrap();
    assert_eq!(stopped.method, StopMethod::Graceful);
    assert!(stopped.confirmed);
    assert!(stopped.message.contains("SIGTERM (graceful)"));
    assert!(supervisor.status_all().is_empty());

    let states: Vec<ProcessState> = events
        .try_iter()
        .filter_map(|event| match event {
            SupervisorEvent::Status { state, .. } => Some(state),
            SupervisorEvent::Log { .. } => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ProcessState::Running,
            ProcessState::Stopping,
            ProcessState::Stopped
        ]
    );
}

/// Worker that survives every signal
struct Unkillable {
    signals: Arc<AtomicUsize>,
}

impl Unkillable {
    fn record(&self) -> io::Result<()> {
        self.signals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl WorkerHandle for Unkillable {
    fn pid(&self) -> u32 {
        4_000_000
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(None)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.record()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.record()
    }

    fn kill_pid(&mut self) -> io::Result<()> {
        self.record()
    }
}

struct UnkillableLauncher {
    signals: Arc<AtomicUsize>,
}

impl ProcessLauncher for UnkillableLauncher {
    fn launch(&self, _spec: &LaunchSpec) -> io::Result<(Box<dyn WorkerHandle>, PipeReader)> {
        // Writer dropped: log capture sees EOF straight away
        let (reader, _writer) = io::pipe()?;
        let handle = Unkillable {
            signals: Arc::clone(&self.signals),
        };
        Ok((Box::new(handle), reader))
    }
}

#[test]
fn test_unkillable_worker_is_dropped_unconfirmed() {
    let signals = Arc::new(AtomicUsize::new(0));
    let (observer, events) = ChannelObserver::new();
    let resolver = StaticResolver::new().with("a", sh("exec sleep 30", StrategyKind::Perp));
    let config = SupervisorConfig {
        crash_probe_ms: 10,
        graceful_stop_ms: 100,
        forceful_stop_ms: 100,
        last_resort_grace_ms: 50,
        ..Default::default()
    };
    let supervisor = ProcessSupervisor::builder(config, Arc::new(resolver))
        .launcher(Arc::new(UnkillableLauncher {
            signals: Arc::clone(&signals),
        }))
        .observer(Arc::new(observer))
        .without_reaper()
        .build();

    let started = supervisor.start("a").unwrap();
    assert_eq!(started.pid, 4_000_000);

    let stopped = supervisor.stop("a", false).unwrap();
    assert_eq!(stopped.method, StopMethod::LastResort);
    assert!(!stopped.confirmed);
    // SIGTERM, SIGKILL via the handle, then kill(2) twice
    assert_eq!(signals.load(Ordering::SeqCst), 4);
    assert!(supervisor.status_all().is_empty());
    assert_eq!(supervisor.tracked_count(), 0);

    let last = events
        .try_iter()
        .filter_map(|event| match event {
            SupervisorEvent::Status { state, .. } => Some(state),
            SupervisorEvent::Log { .. } => None,
        })
        .last();
    assert_eq!(last, Some(ProcessState::Stopped));
}

#[test]
fn test_double_start_is_rejected() {
    let resolver = StaticResolver::new().with("a", sh("exec sleep 30", StrategyKind::Spot));
    let supervisor = supervisor(resolver, fast_config());

    let first = supervisor.start("a").unwrap();
    match supervisor.start("a") {
        Err(SupervisorError::AlreadyRunning { pid, .. }) => assert_eq!(pid, first.pid),
        other => panic!("expected AlreadyRunning, got {:?}", other),
    }
    assert_eq!(supervisor.tracked_count(), 1);

    supervisor.stop("a", false).unwrap();
}

#[test]
fn test_unknown_key_is_not_found() {
    let resolver = StaticResolver::new().with("a", sh("exec sleep 30", StrategyKind::Spot));
    let supervisor = supervisor(resolver, fast_config());
    supervisor.start("a").unwrap();

    assert!(matches!(
        supervisor.stop("b", false),
        Err(SupervisorError::NotFound(_))
    ));
    assert!(matches!(
        supervisor.status("b"),
        Err(SupervisorError::NotFound(_))
    ));
    assert!(matches!(
        supervisor.logs("b", 10),
        Err(SupervisorError::NotFound(_))
    ));
    assert!(matches!(
        supervisor.start("b"),
        Err(SupervisorError::ConfigResolution { .. })
    ));
    assert_eq!(supervisor.status_all().len(), 1);

    supervisor.stop("a", true).unwrap();
}

#[test]
fn test_stubborn_worker_is_force_killed() {
    let resolver = StaticResolver::new().with("a", sh(STUBBORN_WORKER, StrategyKind::Perp));
    let config = SupervisorConfig {
        graceful_stop_ms: 300,
        ..fast_config()
    };
    let supervisor = supervisor(resolver, config);
    supervisor.start("a").unwrap();

    let stopped = supervisor.stop("a", false).unwrap();
    assert_eq!(stopped.method, StopMethod::Forced);
    assert!(stopped.message.contains("SIGKILL (forced)"));
    assert!(supervisor.status_all().is_empty());
}

#[test]
fn test_force_skips_sigterm() {
    let resolver = StaticResolver::new().with("a", sh(GRACEFUL_WORKER, StrategyKind::Grid));
    let supervisor = supervisor(resolver, fast_config());
    supervisor.start("a").unwrap();

    let started = Instant::now();
    let stopped = supervisor.stop("a", true).unwrap();
    assert_eq!(stopped.method, StopMethod::Forced);
    // The SIGTERM trap would have taken a full second
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_immediate_crash_reports_output() {
    let resolver = StaticResolver::new()
        .with(
            "noisy",
            sh("echo 'missing api key' >&2; exit 3", StrategyKind::Spot),
        )
        .with(
            "verbose",
            sh("head -c 600 /dev/zero | tr '\\0' x; exit 1", StrategyKind::Spot),
        )
        .with("silent", sh("exit 4", StrategyKind::Spot));
    let supervisor = supervisor(resolver, fast_config());

    match supervisor.start("noisy") {
        Err(SupervisorError::SpawnFailure { output, .. }) => {
            assert_eq!(output, "missing api key")
        }
        other => panic!("expected SpawnFailure, got {:?}", other),
    }
    match supervisor.start("verbose") {
        Err(SupervisorError::SpawnFailure { output, .. }) => assert_eq!(output.len(), 500),
        other => panic!("expected SpawnFailure, got {:?}", other),
    }
    match supervisor.start("silent") {
        Err(SupervisorError::SpawnFailure { output, .. }) => {
            assert!(output.contains("no output"))
        }
        other => panic!("expected SpawnFailure, got {:?}", other),
    }
    assert_eq!(supervisor.tracked_count(), 0);
}

#[test]
fn test_missing_program_is_spawn_failure() {
    let resolver = StaticResolver::new().with(
        "a",
        LaunchSpec::new("/nonexistent/helm-worker", StrategyKind::Grid),
    );
    let supervisor = supervisor(resolver, fast_config());
    assert!(matches!(
        supervisor.start("a"),
        Err(SupervisorError::SpawnFailure { .. })
    ));
}

#[test]
fn test_log_ring_keeps_latest_lines() {
    let script = "i=0; while [ $i -lt 50 ]; do echo line $i; i=$((i+1)); done; exec sleep 30";
    let resolver = StaticResolver::new().with("a", sh(script, StrategyKind::Grid));
    let config = SupervisorConfig {
        log_capacity: 10,
        ..fast_config()
    };
    let supervisor = supervisor(resolver, config);
    supervisor.start("a").unwrap();

    wait_until("last log line", Duration::from_secs(3), || {
        supervisor
            .logs("a", 1)
            .unwrap()
            .first()
            .is_some_and(|line| line.ends_with("line 49"))
    });

    let logs = supervisor.logs("a", 100).unwrap();
    assert_eq!(logs.len(), 10);
    assert!(logs[0].ends_with("] line 40"));
    assert!(logs.iter().all(|line| line.starts_with('[')));
    assert_eq!(supervisor.logs("a", 3).unwrap().len(), 3);

    supervisor.stop("a", false).unwrap();
}

#[test]
fn test_reaper_marks_crash_then_purges_after_retention() {
    let clock = ManualClock::new(None);
    let (observer, events) = ChannelObserver::new();
    let resolver = StaticResolver::new().with("a", sh("sleep 0.5; exit 2", StrategyKind::Grid));
    let supervisor = ProcessSupervisor::builder(
        SupervisorConfig {
            crash_probe_ms: 100,
            ..Default::default()
        },
        Arc::new(resolver),
    )
    .clock(clock.clone())
    .observer(Arc::new(observer))
    .without_reaper()
    .build();

    supervisor.start("a").unwrap();
    let mut report = ReapReport::default();
    wait_until("crash sweep", Duration::from_secs(3), || {
        report = supervisor.reap_now();
        !report.crashed.is_empty()
    });
    assert_eq!(report.crashed.len(), 1);
    assert!(report.purged.is_empty());

    let status = supervisor.status("a").unwrap();
    assert_eq!(status.state, ProcessState::Crashed);
    assert_eq!(status.exit_code, Some(2));

    // A second sweep does not re-announce the crash
    clock.advance(chrono::Duration::seconds(59));
    assert_eq!(supervisor.reap_now(), ReapReport::default());

    clock.advance(chrono::Duration::seconds(1));
    let report = supervisor.reap_now();
    assert_eq!(report.purged.len(), 1);
    assert!(matches!(
        supervisor.status("a"),
        Err(SupervisorError::NotFound(_))
    ));

    let crashed = events
        .try_iter()
        .filter(|event| {
            matches!(
                event,
                SupervisorEvent::Status {
                    state: ProcessState::Crashed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(crashed, 1);
}

#[test]
fn test_status_query_marks_crash() {
    let clock = ManualClock::new(None);
    let (observer, events) = ChannelObserver::new();
    let resolver = StaticResolver::new().with("a", sh("sleep 0.3; exit 2", StrategyKind::Grid));
    let supervisor = ProcessSupervisor::builder(
        SupervisorConfig {
            crash_probe_ms: 100,
            ..Default::default()
        },
        Arc::new(resolver),
    )
    .clock(clock.clone())
    .observer(Arc::new(observer))
    .without_reaper()
    .build();

    supervisor.start("a").unwrap();
    thread::sleep(Duration::from_millis(800));

    let status = supervisor.status("a").unwrap();
    assert!(!status.alive);
    assert_eq!(status.state, ProcessState::Crashed);
    assert_eq!(status.exit_code, Some(2));
    assert!(status.died_at.is_some());

    // Uptime is frozen at the detected death
    clock.advance(chrono::Duration::seconds(120));
    assert_eq!(supervisor.status_all()[0].uptime_seconds, 0);
    assert_eq!(supervisor.status_all()[0].state, ProcessState::Crashed);

    // Already recorded, so the sweep only purges it later
    assert!(supervisor.reap_now().crashed.is_empty());

    let crashed = events
        .try_iter()
        .filter(|event| {
            matches!(
                event,
                SupervisorEvent::Status {
                    state: ProcessState::Crashed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(crashed, 1);
}

#[test]
fn test_dead_entry_is_replaced_and_stop_reports_already_exited() {
    let resolver = StaticResolver::new().with("a", sh("sleep 0.4", StrategyKind::Spot));
    let supervisor = supervisor(resolver, fast_config());

    supervisor.start("a").unwrap();
    wait_until("worker exit", Duration::from_secs(3), || {
        !supervisor.status("a").unwrap().alive
    });

    let stopped = supervisor.stop("a", false).unwrap();
    assert_eq!(stopped.method, StopMethod::AlreadyExited);
    assert!(supervisor.status_all().is_empty());

    // Start again, let it die, and start over the dead entry
    supervisor.start("a").unwrap();
    wait_until("worker exit", Duration::from_secs(3), || {
        !supervisor.status("a").unwrap().alive
    });
    supervisor.start("a").unwrap();
    assert_eq!(supervisor.tracked_count(), 1);
}

#[test]
fn test_uptime_follows_clock() {
    let clock = ManualClock::new(None);
    let resolver = StaticResolver::new().with("a", sh("exec sleep 30", StrategyKind::Grid));
    let supervisor = ProcessSupervisor::builder(fast_config(), Arc::new(resolver))
        .clock(clock.clone())
        .without_reaper()
        .build();
    supervisor.start("a").unwrap();

    clock.advance(chrono::Duration::seconds(187));
    let status = supervisor.status("a").unwrap();
    assert_eq!(status.uptime_seconds, 187);
    assert_eq!(status.uptime, "3m 7s");

    supervisor.stop("a", false).unwrap();
}

#[test]
fn test_stop_all_stops_everything() {
    let resolver = StaticResolver::new()
        .with("a", sh("exec sleep 30", StrategyKind::Spot))
        .with("b", sh("exec sleep 30", StrategyKind::Perp))
        .with("c", sh("exec sleep 30", StrategyKind::Grid));
    let supervisor = supervisor(resolver, fast_config());
    for key in ["a", "b", "c"] {
        supervisor.start(key).unwrap();
    }

    let report = supervisor.stop_all();
    assert_eq!(report.stopped_count, 3);
    assert_eq!(report.results.len(), 3);
    assert!(supervisor.status_all().is_empty());
}

#[test]
fn test_background_reaper_runs() {
    let resolver = StaticResolver::new().with("a", sh("sleep 0.3", StrategyKind::Grid));
    let config = SupervisorConfig {
        crash_probe_ms: 100,
        reap_interval_ms: 50,
        dead_retention_secs: 0,
        ..Default::default()
    };
    let supervisor = ProcessSupervisor::new(config, Arc::new(resolver));
    supervisor.start("a").unwrap();

    // Marked crashed on one tick, purged on the next
    wait_until("purge", Duration::from_secs(5), || {
        supervisor.tracked_count() == 0
    });
}

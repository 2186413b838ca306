//! Log and status streaming out of the supervisor

use crossbeam_channel::{Receiver, Sender, unbounded};
use helm_core::{ConfigKey, ProcessState};
use log::error;
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives worker output and lifecycle transitions
///
/// Callbacks run on supervisor threads (log drains, the reaper, callers of
/// start/stop), sometimes while the registry lock is held: they must return
/// quickly and must not call back into the supervisor.
pub trait SupervisorObserver: Send + Sync {
    /// One captured line, already prefixed with `[HH:MM:SS]`
    fn on_log_line(&self, _key: &ConfigKey, _line: &str) {}

    fn on_status_change(&self, _key: &ConfigKey, _state: ProcessState, _pid: u32) {}
}

/// Event published by [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Log {
        key: ConfigKey,
        line: String,
    },
    Status {
        key: ConfigKey,
        state: ProcessState,
        pid: u32,
    },
}

/// Observer that forwards every callback as a [`SupervisorEvent`]
pub struct ChannelObserver {
    tx: Sender<SupervisorEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<SupervisorEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl SupervisorObserver for ChannelObserver {
    fn on_log_line(&self, key: &ConfigKey, line: &str) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(SupervisorEvent::Log {
            key: key.clone(),
            line: line.to_string(),
        });
    }

    fn on_status_change(&self, key: &ConfigKey, state: ProcessState, pid: u32) {
        let _ = self.tx.send(SupervisorEvent::Status {
            key: key.clone(),
            state,
            pid,
        });
    }
}

/// Optional observer plus panic accounting, shared by every supervisor thread
#[derive(Default)]
pub(crate) struct ObserverHub {
    observer: Option<Arc<dyn SupervisorObserver>>,
    panics: AtomicU64,
}

impl ObserverHub {
    pub(crate) fn new(observer: Option<Arc<dyn SupervisorObserver>>) -> Self {
        Self {
            observer,
            panics: AtomicU64::new(0),
        }
    }

    pub(crate) fn log_line(&self, key: &ConfigKey, line: &str) {
        if let Some(observer) = &self.observer {
            self.guard(key, || observer.on_log_line(key, line));
        }
    }

    pub(crate) fn status(&self, key: &ConfigKey, state: ProcessState, pid: u32) {
        if let Some(observer) = &self.observer {
            self.guard(key, || observer.on_status_change(key, state, pid));
        }
    }

    pub(crate) fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    fn guard(&self, key: &ConfigKey, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            self.panics.fetch_add(1, Ordering::Relaxed);
            error!("[{}] Observer panicked", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl SupervisorObserver for Exploding {
        fn on_log_line(&self, _key: &ConfigKey, _line: &str) {
            panic!("observer bug");
        }
    }

    #[test]
    fn test_channel_observer_forwards() {
        let (observer, rx) = ChannelObserver::new();
        let hub = ObserverHub::new(Some(Arc::new(observer)));
        let key = ConfigKey::new("grid_btc.json");

        hub.status(&key, ProcessState::Running, 42);
        hub.log_line(&key, "[12:00:00] hello");

        assert_eq!(
            rx.try_recv().unwrap(),
            SupervisorEvent::Status {
                key: key.clone(),
                state: ProcessState::Running,
                pid: 42
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SupervisorEvent::Log {
                key,
                line: "[12:00:00] hello".to_string()
            }
        );
    }

    #[test]
    fn test_observer_panic_contained() {
        let hub = ObserverHub::new(Some(Arc::new(Exploding)));
        let key = ConfigKey::new("a");
        hub.log_line(&key, "x");
        hub.status(&key, ProcessState::Running, 1);
        assert_eq!(hub.panics(), 1);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SupervisorEvent::Status {
            key: ConfigKey::new("a"),
            state: ProcessState::Crashed,
            pid: 7,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"status","key":"a","state":"crashed","pid":7}"#
        );
    }
}

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// What kind of change raised the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Significant order book move
    Orderbook,
    /// One or more fills for the traded instrument
    Fills,
}

/// Pending update flags, as returned by [`UpdateSignal::take`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Updates {
    pub orderbook: bool,
    pub fills: bool,
}

impl Updates {
    /// Check if any flag is set
    pub fn any(&self) -> bool {
        self.orderbook || self.fills
    }
}

/// Coalescing wake primitive between one producer and one consumer
///
/// The flags and the wake condition live under the same lock, so the event is
/// set exactly when at least one flag is set. Raising an already-raised flag is
/// a no-op apart from the notify: ten ticks before the consumer wakes cost one
/// wake-up.
///
/// `wait` does not consume the flags; only `take` clears them. A consumer that
/// waits again without calling `take` returns immediately.
pub struct UpdateSignal {
    state: Mutex<Updates>,
    cond: Condvar,
}

impl UpdateSignal {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Updates::default()),
            cond: Condvar::new(),
        }
    }

    /// Set the flag for `kind` and wake any waiter
    pub fn raise(&self, kind: UpdateKind) {
        let mut state = self.state.lock();
        match kind {
            UpdateKind::Orderbook => state.orderbook = true,
            UpdateKind::Fills => state.fills = true,
        }
        self.cond.notify_all();
    }

    /// Atomically read and clear both flags
    pub fn take(&self) -> Updates {
        std::mem::take(&mut *self.state.lock())
    }

    /// Read the flags without clearing them
    pub fn peek(&self) -> Updates {
        *self.state.lock()
    }

    /// Check if the wake event is currently set
    pub fn is_set(&self) -> bool {
        self.state.lock().any()
    }

    /// Block until a flag is set or `timeout` elapses (None = wait forever)
    ///
    /// Returns true if woken by a signal, false on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock();

        // A timeout too large to represent is the same as no timeout
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        match deadline {
            None => {
                while !state.any() {
                    self.cond.wait(&mut state);
                }
                true
            }
            Some(deadline) => {
                while !state.any() {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        return state.any();
                    }
                }
                true
            }
        }
    }
}

impl Default for UpdateSignal {
    fn default() -> Self {
        Self::new()
    }
}

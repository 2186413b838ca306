//! Decision Loop - event-driven main loop of a strategy worker
//!
//! Blocks on the synchronizer's wake signal instead of polling, and runs the
//! handler when the market moved, when fills arrived, or when the fallback
//! timer expired without either. An unhealthy feed gets one reconnect attempt
//! per iteration; if that fails the handler still runs in degraded mode on a
//! fixed cadence.

use helm_market_data::{MarketDataSynchronizer, Updates};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Slice used when sleeping in degraded mode, so a stop request is seen promptly
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What caused the handler to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Mid moved past the threshold (takes precedence when fills also arrived)
    Orderbook,
    Fills,
    /// Nothing significant within the fallback interval
    Fallback,
    /// Feed unhealthy and reconnect failed
    Degraded,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Orderbook => write!(f, "orderbook update"),
            Trigger::Fills => write!(f, "fill received"),
            Trigger::Fallback => write!(f, "fallback check"),
            Trigger::Degraded => write!(f, "degraded mode"),
        }
    }
}

/// One handler invocation
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub iteration: u64,
    pub trigger: Trigger,
    /// Flags consumed this iteration (both false for Fallback and Degraded)
    pub updates: Updates,
}

/// Handler verdict on whether the loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

pub type HandlerResult = Result<Control, Box<dyn Error + Send + Sync>>;

/// Strategy side of the loop
///
/// Errors and panics are logged and counted; the loop carries on with the
/// next iteration.
pub trait DecisionHandler {
    fn on_tick(&mut self, tick: &Tick, sync: &MarketDataSynchronizer) -> HandlerResult;
}

impl<F> DecisionHandler for F
where
    F: FnMut(&Tick, &MarketDataSynchronizer) -> HandlerResult,
{
    fn on_tick(&mut self, tick: &Tick, sync: &MarketDataSynchronizer) -> HandlerResult {
        self(tick, sync)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Longest the loop waits before running the handler anyway
    #[serde(default = "default_fallback_check_ms")]
    pub fallback_check_ms: u64,
    /// Handler cadence while the feed is down
    #[serde(default = "default_degraded_interval_ms")]
    pub degraded_interval_ms: u64,
    /// Stop after this many iterations (unbounded when unset)
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            fallback_check_ms: default_fallback_check_ms(),
            degraded_interval_ms: default_degraded_interval_ms(),
            max_iterations: None,
        }
    }
}

impl LoopConfig {
    pub fn fallback_check(&self) -> Duration {
        Duration::from_millis(self.fallback_check_ms)
    }

    pub fn degraded_interval(&self) -> Duration {
        Duration::from_millis(self.degraded_interval_ms)
    }
}

// Default value functions for serde
fn default_fallback_check_ms() -> u64 {
    30_000
}

fn default_degraded_interval_ms() -> u64 {
    5_000
}

/// Cloneable request to end the loop
///
/// Seen at the top of the next iteration, so the latency is bounded by the
/// fallback interval.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters returned when the loop ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u64,
    pub orderbook_triggers: u64,
    pub fill_triggers: u64,
    pub fallback_triggers: u64,
    pub degraded_runs: u64,
    pub reconnects: u64,
    pub failed_reconnects: u64,
    pub handler_errors: u64,
}

impl LoopSummary {
    fn record(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Orderbook => self.orderbook_triggers += 1,
            Trigger::Fills => self.fill_triggers += 1,
            Trigger::Fallback => self.fallback_triggers += 1,
            Trigger::Degraded => self.degraded_runs += 1,
        }
    }
}

pub struct DecisionLoop {
    sync: Arc<MarketDataSynchronizer>,
    config: LoopConfig,
    stop: StopHandle,
}

impl DecisionLoop {
    pub fn new(sync: Arc<MarketDataSynchronizer>, config: LoopConfig) -> Self {
        Self {
            sync,
            config,
            stop: StopHandle::default(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn synchronizer(&self) -> &Arc<MarketDataSynchronizer> {
        &self.sync
    }

    /// Run until stopped, the handler returns Stop, or max_iterations is reached
    pub fn run<H: DecisionHandler>(&self, handler: &mut H) -> LoopSummary {
        let coin = self.sync.config().coin.clone();
        let fallback = self.config.fallback_check();
        let mut summary = LoopSummary::default();
        let mut last_run: Option<Instant> = None;

        info!(
            "[{}] Decision loop started (fallback every {:?})",
            coin, fallback
        );

        while !self.stop.is_stopped() {
            if self
                .config
                .max_iterations
                .is_some_and(|max| summary.iterations >= max)
            {
                break;
            }
            let tick = if self.sync.is_healthy() {
                let since_last_run = last_run.map(|at| at.elapsed());
                self.sync
                    .wait_for_update(Some(fallback_wait(fallback, since_last_run)));
                let updates = self.sync.check_updates();
                let trigger = if updates.orderbook {
                    Trigger::Orderbook
                } else if updates.fills {
                    Trigger::Fills
                } else if last_run.is_none_or(|at| at.elapsed() >= fallback) {
                    Trigger::Fallback
                } else {
                    continue;
                };
                Tick {
                    iteration: summary.iterations + 1,
                    trigger,
                    updates,
                }
            } else {
                warn!("[{}] Feed unhealthy, attempting reconnect", coin);
                match self.sync.reconnect() {
                    Ok(()) => {
                        summary.reconnects += 1;
                        info!("[{}] Reconnected, resuming event-driven mode", coin);
                        continue;
                    }
                    Err(e) => {
                        summary.failed_reconnects += 1;
                        debug!("[{}] Running degraded after failed reconnect: {}", coin, e);
                    }
                }
                Tick {
                    iteration: summary.iterations + 1,
                    trigger: Trigger::Degraded,
                    updates: Updates::default(),
                }
            };

            summary.iterations = tick.iteration;
            debug!("[{}] Iteration {}: {}", coin, tick.iteration, tick.trigger);
            summary.record(tick.trigger);
            last_run = Some(Instant::now());

            let outcome = catch_unwind(AssertUnwindSafe(|| handler.on_tick(&tick, &self.sync)));
            match outcome {
                Ok(Ok(Control::Continue)) => {}
                Ok(Ok(Control::Stop)) => {
                    info!("[{}] Handler requested stop", coin);
                    break;
                }
                Ok(Err(e)) => {
                    summary.handler_errors += 1;
                    error!("[{}] Handler failed on {}: {}", coin, tick.trigger, e);
                }
                Err(_) => {
                    summary.handler_errors += 1;
                    error!("[{}] Handler panicked on {}", coin, tick.trigger);
                }
            }

            if tick.trigger == Trigger::Degraded {
                self.pause(self.config.degraded_interval());
            }
        }

        info!(
            "[{}] Decision loop finished after {} iterations",
            coin, summary.iterations
        );
        summary
    }

    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stop.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(STOP_POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Time left until the fallback trigger is due
fn fallback_wait(fallback: Duration, since_last_run: Option<Duration>) -> Duration {
    since_last_run.map_or(fallback, |elapsed| fallback.saturating_sub(elapsed))
}

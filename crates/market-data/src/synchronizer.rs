//! Market data synchronizer
//!
//! Producer side runs on the transport thread (`handle`), consumer side on the
//! worker's decision thread. Three disjoint locks guard the orderbook cache, the
//! pending fills and the link state; none is held while another is taken, and
//! the wake signal is raised only after the cache locks are released.

use helm_clock::SystemClock;
use helm_core::{AccountEvent, Clock, Fill, OrderbookSnapshot, Timestamp};
use helm_gateway::{
    BookMessage, DisconnectCallback, FeedCallback, FeedMessage, FillBatch, PushSession,
    PushTransport, Topic,
};
use helm_sync::{UpdateKind, UpdateSignal, Updates};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SynchronizerConfig;
use crate::error::SyncError;

/// Orderbook message rate is logged once per window
const RATE_LOG_WINDOW: Duration = Duration::from_secs(30);

/// Called on the transport thread after every significant update
pub type UpdateListener = Arc<dyn Fn(UpdateKind) + Send + Sync>;

/// Point-in-time view of the synchronizer's health counters
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStats {
    pub connected: bool,
    pub healthy: bool,
    pub error_count: u64,
    pub last_update: Option<Timestamp>,
    pub subscriptions: usize,
    pub orderbook_messages: u64,
    pub pending_fills: usize,
}

#[derive(Default)]
struct BookCache {
    snapshot: Option<OrderbookSnapshot>,
    /// Books cached since the current session opened
    session_books: u64,
}

struct LinkState {
    connected: bool,
    connected_at: Option<Timestamp>,
    last_update: Option<Timestamp>,
    latest_account_event: Option<AccountEvent>,
    rate_window_start: Instant,
    rate_window_count: u64,
}

/// State reachable from transport callbacks
struct Shared {
    coin: String,
    pair_name: Option<String>,
    threshold_bps: Decimal,
    depth_levels: usize,
    skip_fill_snapshots: bool,
    clock: Arc<dyn Clock>,
    listener: Option<UpdateListener>,

    book: Mutex<BookCache>,
    book_arrived: Condvar,
    fills: Mutex<VecDeque<Fill>>,
    state: Mutex<LinkState>,
    signal: UpdateSignal,

    error_count: AtomicU64,
    orderbook_messages: AtomicU64,
}

/// Bridges an exchange push feed into a cache a synchronous loop can poll or wait on
pub struct MarketDataSynchronizer {
    config: SynchronizerConfig,
    transport: Arc<dyn PushTransport>,
    session: Mutex<Option<Box<dyn PushSession>>>,
    shared: Arc<Shared>,
}

impl MarketDataSynchronizer {
    pub fn new(config: SynchronizerConfig, transport: Arc<dyn PushTransport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        config: SynchronizerConfig,
        transport: Arc<dyn PushTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(config, transport, clock, None)
    }

    /// Same as `with_clock`, plus a listener invoked on every significant update
    pub fn with_listener(
        config: SynchronizerConfig,
        transport: Arc<dyn PushTransport>,
        clock: Arc<dyn Clock>,
        listener: UpdateListener,
    ) -> Self {
        Self::build(config, transport, clock, Some(listener))
    }

    fn build(
        config: SynchronizerConfig,
        transport: Arc<dyn PushTransport>,
        clock: Arc<dyn Clock>,
        listener: Option<UpdateListener>,
    ) -> Self {
        let shared = Arc::new(Shared {
            coin: config.coin.clone(),
            pair_name: config.pair_name.clone(),
            threshold_bps: config.update_threshold_bps,
            depth_levels: config.depth_levels,
            skip_fill_snapshots: config.skip_fill_snapshots,
            clock,
            listener,
            book: Mutex::new(BookCache::default()),
            book_arrived: Condvar::new(),
            fills: Mutex::new(VecDeque::new()),
            state: Mutex::new(LinkState {
                connected: false,
                connected_at: None,
                last_update: None,
                latest_account_event: None,
                rate_window_start: Instant::now(),
                rate_window_count: 0,
            }),
            signal: UpdateSignal::new(),
            error_count: AtomicU64::new(0),
            orderbook_messages: AtomicU64::new(0),
        });

        Self {
            config,
            transport,
            session: Mutex::new(None),
            shared,
        }
    }

    pub fn config(&self) -> &SynchronizerConfig {
        &self.config
    }

    /// Open a session, subscribe to book, fills and account events, and wait for the first book
    ///
    /// A missing first book only logs a warning. Calling start() while the
    /// session is up is a no-op; a session the transport dropped is replaced.
    pub fn start(&self) -> Result<(), SyncError> {
        let coin = &self.config.coin;
        {
            let mut slot = self.session.lock();
            if slot.is_some() {
                if self.shared.state.lock().connected {
                    debug!("[{}] Market data already started", coin);
                    return Ok(());
                }
                debug!("[{}] Replacing dropped session", coin);
                if let Some(stale) = slot.take() {
                    self.retire(stale);
                }
            }

            let shared = Arc::clone(&self.shared);
            let on_disconnect: DisconnectCallback =
                Arc::new(move |reason: &str| shared.on_disconnect(reason));

            let mut session = self.transport.connect(on_disconnect).map_err(|e| {
                self.shared.error_count.fetch_add(1, Ordering::Relaxed);
                error!("[{}] Failed to open {} session: {}", coin, self.transport.name(), e);
                SyncError::TransportDisconnect(e)
            })?;

            self.shared.book.lock().session_books = 0;
            {
                let mut state = self.shared.state.lock();
                state.connected = true;
                state.connected_at = Some(self.shared.clock.now());
                state.last_update = None;
            }

            let topics = [
                Topic::OrderBook { coin: coin.clone() },
                Topic::Fills {
                    user: self.config.user.clone(),
                },
                Topic::AccountEvents {
                    user: self.config.user.clone(),
                },
            ];
            for topic in topics {
                let shared = Arc::clone(&self.shared);
                let callback: FeedCallback = Arc::new(move |msg: &FeedMessage| shared.handle(msg));
                if let Err(e) = session.subscribe(topic.clone(), callback) {
                    error!("[{}] Subscribe to {} failed: {}", coin, topic, e);
                    session.close();
                    self.shared.error_count.fetch_add(1, Ordering::Relaxed);
                    self.shared.state.lock().connected = false;
                    return Err(SyncError::TransportDisconnect(e));
                }
                debug!("[{}] Subscribed to {}", coin, topic);
            }

            *slot = Some(session);
        }
        info!("[{}] Market data started via {}", coin, self.transport.name());

        if self.shared.wait_for_first_book(self.config.first_data_wait()) {
            debug!("[{}] First orderbook received", coin);
        } else {
            warn!(
                "[{}] No orderbook within {}ms, running degraded until data arrives",
                coin, self.config.first_data_wait_ms
            );
        }
        Ok(())
    }

    /// Close the session; cached data stays readable
    pub fn stop(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            self.retire(session);
            info!("[{}] Market data stopped", self.config.coin);
        }
        self.shared.state.lock().connected = false;
    }

    /// Close a session, keeping its errors in the running total
    fn retire(&self, mut session: Box<dyn PushSession>) {
        self.shared
            .error_count
            .fetch_add(session.error_count(), Ordering::Relaxed);
        session.close();
    }

    /// Stop, wait the reconnect delay, start again; a single attempt
    pub fn reconnect(&self) -> Result<(), SyncError> {
        info!(
            "[{}] Reconnecting in {}ms",
            self.config.coin, self.config.reconnect_delay_ms
        );
        self.stop();
        thread::sleep(self.config.reconnect_delay());
        match self.start() {
            Ok(()) => {
                info!("[{}] Reconnected", self.config.coin);
                Ok(())
            }
            Err(e) => {
                warn!("[{}] Reconnect failed: {}", self.config.coin, e);
                Err(e)
            }
        }
    }

    /// Atomically read and clear the pending update flags
    pub fn check_updates(&self) -> Updates {
        self.shared.signal.take()
    }

    /// Block until an update is pending or `timeout` elapses; does not clear the flags
    pub fn wait_for_update(&self, timeout: Option<Duration>) -> bool {
        self.shared.signal.wait(timeout)
    }

    pub fn is_healthy(&self) -> bool {
        let state = self.shared.state.lock();
        if !state.connected {
            return false;
        }

        let now = self.shared.clock.now();
        let staleness =
            chrono::Duration::from_std(self.config.staleness()).unwrap_or(chrono::Duration::MAX);
        match (state.last_update, state.connected_at) {
            (Some(last), _) => now - last < staleness,
            // Grace period while waiting for the first book of the session
            (None, Some(opened)) => now - opened < staleness,
            (None, None) => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    /// Copy of the cached orderbook snapshot
    pub fn orderbook(&self) -> Option<OrderbookSnapshot> {
        self.shared.book.lock().snapshot.clone()
    }

    /// Drain the pending fills, oldest first
    pub fn take_fills(&self) -> Vec<Fill> {
        self.shared.fills.lock().drain(..).collect()
    }

    pub fn latest_account_event(&self) -> Option<AccountEvent> {
        self.shared.state.lock().latest_account_event.clone()
    }

    /// Handler panics, disconnects and failed connects, plus the session's own decode errors
    pub fn error_count(&self) -> u64 {
        let session_errors = self
            .session
            .lock()
            .as_ref()
            .map_or(0, |session| session.error_count());
        self.shared.error_count.load(Ordering::Relaxed) + session_errors
    }

    pub fn stats(&self) -> SyncStats {
        let subscriptions = self
            .session
            .lock()
            .as_ref()
            .map_or(0, |session| session.subscription_count());
        let (connected, last_update) = {
            let state = self.shared.state.lock();
            (state.connected, state.last_update)
        };

        SyncStats {
            connected,
            healthy: self.is_healthy(),
            error_count: self.error_count(),
            last_update,
            subscriptions,
            orderbook_messages: self.shared.orderbook_messages.load(Ordering::Relaxed),
            pending_fills: self.shared.fills.lock().len(),
        }
    }
}

impl Drop for MarketDataSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    /// Entry point for every message the session routes to us
    fn handle(&self, msg: &FeedMessage) {
        let outcome = catch_unwind(AssertUnwindSafe(|| match msg {
            FeedMessage::OrderBook(book) => self.on_orderbook(book),
            FeedMessage::Fills(batch) => self.on_fills(batch),
            FeedMessage::AccountEvent(event) => self.on_account_event(event),
        }));

        if outcome.is_err() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            error!("[{}] Handler panicked on {} message", self.coin, msg.kind());
        }
    }

    fn on_orderbook(&self, book: &BookMessage) {
        self.orderbook_messages.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();
        let Some(snapshot) = OrderbookSnapshot::from_levels(
            book.coin.clone(),
            book.bids.iter().take(self.depth_levels).copied().collect(),
            book.asks.iter().take(self.depth_levels).copied().collect(),
            self.depth_levels,
            book.time_ms,
            now,
        ) else {
            debug!("[{}] Discarding one-sided book", self.coin);
            return;
        };

        let significant = {
            let mut cache = self.book.lock();
            let significant = match &cache.snapshot {
                None => true,
                Some(previous) => snapshot
                    .mid_change_bps(previous.mid)
                    .is_none_or(|bps| bps > self.threshold_bps),
            };
            cache.snapshot = Some(snapshot);
            cache.session_books += 1;
            self.book_arrived.notify_all();
            significant
        };

        {
            let mut state = self.state.lock();
            state.last_update = Some(now);
            state.rate_window_count += 1;
            let elapsed = state.rate_window_start.elapsed();
            if elapsed >= RATE_LOG_WINDOW {
                debug!(
                    "[{}] {} orderbook messages in {}s ({:.1}/s)",
                    self.coin,
                    state.rate_window_count,
                    elapsed.as_secs(),
                    state.rate_window_count as f64 / elapsed.as_secs_f64()
                );
                state.rate_window_start = Instant::now();
                state.rate_window_count = 0;
            }
        }

        if significant {
            self.notify(UpdateKind::Orderbook);
        }
    }

    fn on_fills(&self, batch: &FillBatch) {
        if batch.is_snapshot && self.skip_fill_snapshots {
            debug!(
                "[{}] Skipping snapshot batch of {} fills",
                self.coin,
                batch.fills.len()
            );
            return;
        }

        let (matched, ignored): (Vec<&Fill>, Vec<&Fill>) = batch
            .fills
            .iter()
            .partition(|fill| fill.matches_instrument(&self.coin, self.pair_name.as_deref()));

        for fill in &ignored {
            debug!("[{}] Ignoring fill for {}", self.coin, fill.coin);
        }
        if matched.is_empty() {
            return;
        }

        info!("[{}] {} new fill(s)", self.coin, matched.len());
        self.fills.lock().extend(matched.into_iter().cloned());
        self.notify(UpdateKind::Fills);
    }

    fn on_account_event(&self, event: &AccountEvent) {
        match event {
            AccountEvent::Liquidation {
                liquidated_notional,
                account_value,
                ..
            } => warn!(
                "[{}] Account liquidated: notional {} account value {}",
                self.coin, liquidated_notional, account_value
            ),
            other => debug!("[{}] Account event: {}", self.coin, other.kind()),
        }
        self.state.lock().latest_account_event = Some(event.clone());
    }

    fn on_disconnect(&self, reason: &str) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.state.lock().connected = false;
        warn!("[{}] Feed disconnected: {}", self.coin, reason);
    }

    fn notify(&self, kind: UpdateKind) {
        self.signal.raise(kind);
        if let Some(listener) = &self.listener {
            listener(kind);
        }
    }

    fn wait_for_first_book(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cache = self.book.lock();
        while cache.session_books == 0 {
            if self.book_arrived.wait_until(&mut cache, deadline).timed_out() {
                return cache.session_books > 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_clock::ManualClock;
    use helm_core::{BookLevel, Side};
    use helm_gateway::{ChannelFeed, ChannelTransport};
    use rust_decimal_macros::dec;

    fn config() -> SynchronizerConfig {
        SynchronizerConfig {
            first_data_wait_ms: 50,
            reconnect_delay_ms: 10,
            ..SynchronizerConfig::new("BTC", "0xabc")
        }
    }

    fn synchronizer(config: SynchronizerConfig) -> (MarketDataSynchronizer, ChannelFeed) {
        let (transport, feed) = ChannelTransport::pair();
        (
            MarketDataSynchronizer::new(config, Arc::new(transport)),
            feed,
        )
    }

    fn book(coin: &str, bid: Decimal, ask: Decimal) -> BookMessage {
        BookMessage {
            coin: coin.to_string(),
            time_ms: 0,
            bids: vec![BookLevel::new(bid, dec!(1)), BookLevel::new(bid - dec!(1), dec!(2))],
            asks: vec![BookLevel::new(ask, dec!(3))],
        }
    }

    fn fill(coin: &str) -> Fill {
        Fill {
            coin: coin.to_string(),
            side: Side::Sell,
            price: dec!(100),
            size: dec!(1),
            time_ms: 0,
            order_id: 1,
            trade_id: 1,
            fee: Decimal::ZERO,
            fee_token: "USDC".to_string(),
            closed_pnl: Decimal::ZERO,
            crossed: false,
        }
    }

    fn batch(fills: Vec<Fill>, is_snapshot: bool) -> FillBatch {
        FillBatch {
            user: "0xabc".to_string(),
            is_snapshot,
            fills,
        }
    }

    #[test]
    fn test_first_book_is_significant() {
        let (sync, _feed) = synchronizer(config());
        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99), dec!(101))));

        assert_eq!(
            sync.check_updates(),
            Updates {
                orderbook: true,
                fills: false
            }
        );
        let snapshot = sync.orderbook().unwrap();
        assert_eq!(snapshot.mid, dec!(100));
        assert_eq!(snapshot.bid_depth, dec!(3));
        assert_eq!(snapshot.ask_depth, dec!(3));
    }

    #[test]
    fn test_sub_threshold_move_updates_cache_only() {
        let (sync, _feed) = synchronizer(config());
        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99), dec!(101))));
        sync.check_updates();

        // mid 100 -> 100.04 is 4 bps
        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99.08), dec!(101))));
        assert!(!sync.check_updates().any());
        assert_eq!(sync.orderbook().unwrap().mid, dec!(100.04));
    }

    #[test]
    fn test_threshold_is_strict() {
        let (sync, _feed) = synchronizer(config());
        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99), dec!(101))));
        sync.check_updates();

        // Exactly 5 bps does not wake
        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99.1), dec!(101))));
        assert!(!sync.check_updates().orderbook);
    }

    #[test]
    fn test_one_sided_book_discarded() {
        let (sync, _feed) = synchronizer(config());
        let mut msg = book("BTC", dec!(99), dec!(101));
        msg.asks.clear();
        sync.shared.handle(&FeedMessage::OrderBook(msg));

        assert!(sync.orderbook().is_none());
        assert!(!sync.check_updates().any());
    }

    #[test]
    fn test_fill_matching_forms() {
        let config = SynchronizerConfig {
            pair_name: Some("xyz:BTC/USDC".to_string()),
            ..SynchronizerConfig::new("xyz:BTC", "0xabc")
        };
        let (sync, _feed) = synchronizer(config);

        sync.shared.handle(&FeedMessage::Fills(batch(
            vec![
                fill("xyz:BTC"),
                fill("BTC"),
                fill("BTC/USDC"),
                fill("ETH"),
            ],
            false,
        )));

        let fills = sync.take_fills();
        assert_eq!(fills.len(), 3);
        assert!(fills.iter().all(|f| f.coin != "ETH"));
        assert!(sync.check_updates().fills);
        assert!(sync.take_fills().is_empty());
    }

    #[test]
    fn test_unmatched_fills_do_not_wake() {
        let (sync, _feed) = synchronizer(config());
        sync.shared
            .handle(&FeedMessage::Fills(batch(vec![fill("ETH")], false)));
        assert!(!sync.check_updates().any());
        assert!(sync.take_fills().is_empty());
    }

    #[test]
    fn test_snapshot_fills_skipped_when_configured() {
        let config = SynchronizerConfig {
            skip_fill_snapshots: true,
            ..config()
        };
        let (sync, _feed) = synchronizer(config);
        sync.shared
            .handle(&FeedMessage::Fills(batch(vec![fill("BTC")], true)));
        assert!(sync.take_fills().is_empty());

        sync.shared
            .handle(&FeedMessage::Fills(batch(vec![fill("BTC")], false)));
        assert_eq!(sync.take_fills().len(), 1);
    }

    #[test]
    fn test_account_event_cached() {
        let (sync, _feed) = synchronizer(config());
        let event = AccountEvent::NonUserCancel {
            coins: vec!["BTC".to_string()],
        };
        sync.shared.handle(&FeedMessage::AccountEvent(event.clone()));
        assert_eq!(sync.latest_account_event(), Some(event));
        assert!(!sync.check_updates().any());
    }

    #[test]
    fn test_listener_fires_on_significant_only() {
        let (transport, _feed) = ChannelTransport::pair();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let sync = MarketDataSynchronizer::with_listener(
            config(),
            Arc::new(transport),
            Arc::new(SystemClock::new()),
            Arc::new(move |_: UpdateKind| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99), dec!(101))));
        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99), dec!(101))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_counted() {
        let (transport, _feed) = ChannelTransport::pair();
        let sync = MarketDataSynchronizer::with_listener(
            config(),
            Arc::new(transport),
            Arc::new(SystemClock::new()),
            Arc::new(|_: UpdateKind| panic!("listener bug")),
        );

        sync.shared.handle(&FeedMessage::OrderBook(book("BTC", dec!(99), dec!(101))));
        assert_eq!(sync.error_count(), 1);
        // Cache update happened before the listener ran
        assert!(sync.orderbook().is_some());
    }

    #[test]
    fn test_health_grace_and_staleness() {
        let clock = ManualClock::new(None);
        let (transport, feed) = ChannelTransport::pair();
        let sync = MarketDataSynchronizer::with_clock(config(), Arc::new(transport), clock.clone());

        assert!(!sync.is_healthy());
        sync.start().unwrap();

        // No data yet, inside the grace period
        assert!(sync.is_healthy());
        clock.advance(chrono::Duration::seconds(31));
        assert!(!sync.is_healthy());

        feed.publish(FeedMessage::OrderBook(book("BTC", dec!(99), dec!(101))))
            .unwrap();
        assert!(sync.wait_for_update(Some(Duration::from_secs(1))));
        assert!(sync.is_healthy());

        clock.advance(chrono::Duration::seconds(29));
        assert!(sync.is_healthy());
        clock.advance(chrono::Duration::seconds(1));
        assert!(!sync.is_healthy());
    }

    #[test]
    fn test_start_failure_leaves_disconnected() {
        let (transport, feed) = ChannelTransport::pair();
        feed.set_available(false);
        let sync = MarketDataSynchronizer::new(config(), Arc::new(transport));

        assert!(matches!(
            sync.start(),
            Err(SyncError::TransportDisconnect(_))
        ));
        assert!(!sync.is_connected());
        assert!(!sync.is_healthy());
        assert_eq!(sync.error_count(), 1);
    }

    /// Transport whose sessions each report a fixed number of decode errors
    struct NoisyTransport;

    struct NoisySession {
        subscriptions: usize,
    }

    impl PushTransport for NoisyTransport {
        fn connect(
            &self,
            _on_disconnect: DisconnectCallback,
        ) -> Result<Box<dyn PushSession>, helm_gateway::TransportError> {
            Ok(Box::new(NoisySession { subscriptions: 0 }))
        }

        fn name(&self) -> &str {
            "noisy"
        }
    }

    impl PushSession for NoisySession {
        fn subscribe(
            &mut self,
            _topic: Topic,
            _callback: FeedCallback,
        ) -> Result<helm_gateway::SubscriptionId, helm_gateway::TransportError> {
            self.subscriptions += 1;
            Ok(helm_gateway::SubscriptionId(self.subscriptions as u64))
        }

        fn unsubscribe(
            &mut self,
            _id: helm_gateway::SubscriptionId,
        ) -> Result<(), helm_gateway::TransportError> {
            self.subscriptions = self.subscriptions.saturating_sub(1);
            Ok(())
        }

        fn subscription_count(&self) -> usize {
            self.subscriptions
        }

        fn error_count(&self) -> u64 {
            2
        }

        fn close(&mut self) {
            self.subscriptions = 0;
        }
    }

    #[test]
    fn test_error_count_survives_session_replacement() {
        let sync = MarketDataSynchronizer::new(config(), Arc::new(NoisyTransport));
        sync.start().unwrap();
        assert_eq!(sync.error_count(), 2);

        sync.reconnect().unwrap();
        assert_eq!(sync.error_count(), 4);

        sync.stop();
        assert_eq!(sync.error_count(), 4);
    }

    #[test]
    fn test_start_after_drop_opens_new_session() {
        let (sync, feed) = synchronizer(config());
        sync.start().unwrap();
        feed.disconnect("drop");
        let deadline = Instant::now() + Duration::from_secs(2);
        while sync.is_connected() {
            assert!(Instant::now() < deadline, "disconnect not seen");
            thread::sleep(Duration::from_millis(5));
        }

        sync.start().unwrap();
        assert!(sync.is_connected());
        assert_eq!(feed.sessions_opened(), 2);
        assert_eq!(sync.stats().subscriptions, 3);

        // A live session is left alone
        sync.start().unwrap();
        assert_eq!(feed.sessions_opened(), 2);
    }

    #[test]
    fn test_start_subscribes_three_topics() {
        let (sync, feed) = synchronizer(config());
        sync.start().unwrap();

        let stats = sync.stats();
        assert!(stats.connected);
        assert_eq!(stats.subscriptions, 3);
        assert_eq!(
            feed.subscribed_topics(),
            vec![
                Topic::OrderBook {
                    coin: "BTC".to_string()
                },
                Topic::Fills {
                    user: "0xabc".to_string()
                },
                Topic::AccountEvents {
                    user: "0xabc".to_string()
                },
            ]
        );
    }
}

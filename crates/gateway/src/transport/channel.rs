//! Crossbeam channel-based transport for single-process mode
//!
//! A [`ChannelFeed`] stands in for the exchange: whatever it publishes is
//! delivered by a dedicated session thread to the matching subscriptions, the
//! same way the websocket session delivers from its runtime thread. Used for
//! tests, replay and simulation.
//!
//! Messages published while no session is open stay queued and go to the next
//! session that connects.

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use super::router::SubscriptionRouter;
use super::{DisconnectCallback, FeedCallback, PushSession, PushTransport, SubscriptionId, Topic};
use crate::error::TransportError;
use crate::messages::FeedMessage;

enum FeedEvent {
    Message(FeedMessage),
    Disconnect(String),
}

struct FeedShared {
    available: AtomicBool,
    sessions_opened: AtomicU64,
    /// Every topic subscribed, across all sessions, in order
    subscriptions: Mutex<Vec<Topic>>,
}

/// Transport side: opens sessions that drain the feed
pub struct ChannelTransport {
    rx: Receiver<FeedEvent>,
    shared: Arc<FeedShared>,
}

/// Exchange side: publishes messages and simulates connection trouble
#[derive(Clone)]
pub struct ChannelFeed {
    tx: Sender<FeedEvent>,
    shared: Arc<FeedShared>,
}

impl ChannelTransport {
    /// Create a transport/feed pair
    pub fn pair() -> (Self, ChannelFeed) {
        let (tx, rx) = unbounded();
        let shared = Arc::new(FeedShared {
            available: AtomicBool::new(true),
            sessions_opened: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        });
        (
            Self {
                rx,
                shared: Arc::clone(&shared),
            },
            ChannelFeed { tx, shared },
        )
    }
}

impl PushTransport for ChannelTransport {
    fn connect(
        &self,
        on_disconnect: DisconnectCallback,
    ) -> Result<Box<dyn PushSession>, TransportError> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("feed unavailable".to_string()));
        }

        let router = Arc::new(SubscriptionRouter::new());
        let (stop_tx, stop_rx) = unbounded::<()>();
        let rx = self.rx.clone();
        let session_id = self.shared.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;

        let delivery_router = Arc::clone(&router);
        let thread = thread::Builder::new()
            .name(format!("channel-feed-{}", session_id))
            .spawn(move || {
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(rx) -> event => match event {
                            Ok(FeedEvent::Message(msg)) => {
                                delivery_router.dispatch(&msg);
                            }
                            Ok(FeedEvent::Disconnect(reason)) => {
                                warn!("Channel session {} disconnected: {}", session_id, reason);
                                on_disconnect(&reason);
                                break;
                            }
                            Err(_) => {
                                on_disconnect("feed dropped");
                                break;
                            }
                        }
                    }
                }
                debug!("Channel session {} delivery thread exiting", session_id);
            })
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Box::new(ChannelSession {
            router,
            shared: Arc::clone(&self.shared),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

impl ChannelFeed {
    /// Push a message to the open session (or the next one)
    pub fn publish(&self, msg: FeedMessage) -> Result<(), TransportError> {
        self.tx
            .send(FeedEvent::Message(msg))
            .map_err(|_| TransportError::SessionClosed)
    }

    /// Make the open session drop as if the server closed the socket
    pub fn disconnect(&self, reason: impl Into<String>) {
        let _ = self.tx.send(FeedEvent::Disconnect(reason.into()));
    }

    /// Refuse (false) or accept (true) future connection attempts
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Every topic subscribed so far, across sessions
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.shared.subscriptions.lock().clone()
    }

    /// Number of sessions opened so far
    pub fn sessions_opened(&self) -> u64 {
        self.shared.sessions_opened.load(Ordering::SeqCst)
    }
}

/// Session over the in-process feed
pub struct ChannelSession {
    router: Arc<SubscriptionRouter>,
    shared: Arc<FeedShared>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PushSession for ChannelSession {
    fn subscribe(
        &mut self,
        topic: Topic,
        callback: FeedCallback,
    ) -> Result<SubscriptionId, TransportError> {
        if self.stop_tx.is_none() {
            return Err(TransportError::SessionClosed);
        }
        self.shared.subscriptions.lock().push(topic.clone());
        Ok(self.router.add(topic, callback))
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError> {
        self.router
            .remove(id)
            .map(|_| ())
            .ok_or(TransportError::UnknownSubscription(id.0))
    }

    fn subscription_count(&self) -> usize {
        self.router.len()
    }

    fn error_count(&self) -> u64 {
        self.router.callback_panics()
    }

    fn close(&mut self) {
        // Dropping the sender wakes the delivery thread's select
        self.stop_tx.take();
        self.router.clear();
        if let Some(handle) = self.thread.take()
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::BookMessage;
    use std::time::Duration;

    fn book(coin: &str) -> FeedMessage {
        FeedMessage::OrderBook(BookMessage {
            coin: coin.to_string(),
            time_ms: 0,
            bids: vec![],
            asks: vec![],
        })
    }

    #[test]
    fn test_delivers_on_session_thread() {
        let (transport, feed) = ChannelTransport::pair();
        let mut session = transport.connect(Arc::new(|_: &str| {})).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        session
            .subscribe(
                Topic::OrderBook { coin: "BTC".into() },
                Arc::new(move |msg: &FeedMessage| {
                    let _ = tx.try_send((msg.clone(), thread::current().id()));
                }),
            )
            .unwrap();

        feed.publish(book("BTC")).unwrap();
        let (msg, delivered_on) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(msg, book("BTC"));
        assert_ne!(delivered_on, thread::current().id());
        assert_eq!(feed.subscribed_topics().len(), 1);
    }

    #[test]
    fn test_unavailable_feed_refuses_connect() {
        let (transport, feed) = ChannelTransport::pair();
        feed.set_available(false);
        assert!(matches!(
            transport.connect(Arc::new(|_: &str| {})),
            Err(TransportError::Connection(_))
        ));
        feed.set_available(true);
        assert!(transport.connect(Arc::new(|_: &str| {})).is_ok());
        assert_eq!(feed.sessions_opened(), 1);
    }

    #[test]
    fn test_disconnect_invokes_callback() {
        let (transport, feed) = ChannelTransport::pair();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let _session = transport
            .connect(Arc::new(move |reason: &str| {
                let _ = tx.try_send(reason.to_string());
            }))
            .unwrap();

        feed.disconnect("server restart");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            "server restart"
        );
    }

    #[test]
    fn test_closed_session_rejects_subscribe() {
        let (transport, _feed) = ChannelTransport::pair();
        let mut session = transport.connect(Arc::new(|_: &str| {})).unwrap();
        session.close();
        session.close();
        assert_eq!(
            session
                .subscribe(
                    Topic::Fills { user: "0x1".into() },
                    Arc::new(|_: &FeedMessage| {})
                )
                .unwrap_err(),
            TransportError::SessionClosed
        );
    }
}

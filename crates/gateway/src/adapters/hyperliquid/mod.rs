//! Hyperliquid websocket adapter
//!
//! Each session owns one OS thread running a single-threaded tokio runtime.
//! The runtime drives the socket: outgoing subscribe requests and keepalive
//! pings, incoming frames decoded and dispatched through the session's
//! [`SubscriptionRouter`]. Subscriber callbacks therefore run on that thread.

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::TransportError;
use crate::messages::hyperliquid::{self, PING, WireEvent};
use crate::transport::config::FeedConfig;
use crate::transport::router::SubscriptionRouter;
use crate::transport::{
    DisconnectCallback, FeedCallback, PushSession, PushTransport, SubscriptionId, Topic,
};

/// Grace added on top of the connect timeout before the caller gives up
const HANDSHAKE_GRACE: Duration = Duration::from_secs(1);

enum Command {
    Send(String),
    Close,
}

/// Opens websocket sessions against a Hyperliquid endpoint
pub struct HyperliquidTransport {
    config: FeedConfig,
}

impl HyperliquidTransport {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

impl Default for HyperliquidTransport {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}

impl PushTransport for HyperliquidTransport {
    fn connect(
        &self,
        on_disconnect: DisconnectCallback,
    ) -> Result<Box<dyn PushSession>, TransportError> {
        let router = Arc::new(SubscriptionRouter::new());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let config = self.config.clone();
        let session_router = Arc::clone(&router);
        let thread = thread::Builder::new()
            .name("hyperliquid-ws".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(TransportError::Connection(e.to_string())));
                        return;
                    }
                };
                runtime.block_on(run_session(
                    config,
                    session_router,
                    cmd_rx,
                    ready_tx,
                    on_disconnect,
                ));
            })
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        match ready_rx.recv_timeout(self.config.connect_timeout() + HANDSHAKE_GRACE) {
            Ok(Ok(())) => Ok(Box::new(HyperliquidSession {
                cmd_tx,
                router,
                thread: Some(thread),
                closed: false,
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                // Runtime thread is wedged; tell it to close whenever it gets there
                let _ = cmd_tx.send(Command::Close);
                Err(TransportError::Timeout)
            }
        }
    }

    fn name(&self) -> &str {
        "hyperliquid"
    }
}

async fn run_session(
    config: FeedConfig,
    router: Arc<SubscriptionRouter>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    ready_tx: crossbeam_channel::Sender<Result<(), TransportError>>,
    on_disconnect: DisconnectCallback,
) {
    // Only the first install in the process wins; later calls are no-ops
    let _ = rustls::crypto::ring::default_provider().install_default();

    let connect = connect_async(config.ws_url.as_str());
    let stream = match tokio::time::timeout(config.connect_timeout(), connect).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            let _ = ready_tx.send(Err(TransportError::Connection(e.to_string())));
            return;
        }
        Err(_) => {
            let _ = ready_tx.send(Err(TransportError::Timeout));
            return;
        }
    };
    info!("Connected to {}", config.ws_url);
    let _ = ready_tx.send(Ok(()));

    let (mut write, mut read) = stream.split();
    let mut ping = tokio::time::interval(config.ping_interval());
    // First tick completes immediately
    ping.tick().await;

    let lost: Option<String> = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        break Some(format!("send failed: {}", e));
                    }
                }
                Some(Command::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break None;
                }
            },
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Text(PING.to_string().into())).await {
                    break Some(format!("ping failed: {}", e));
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text(&router, text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    break Some(match frame {
                        Some(frame) => format!("server closed connection: {}", frame.reason.as_str()),
                        None => "server closed connection".to_string(),
                    });
                }
                // Protocol-level pings are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break Some("stream ended".to_string()),
            }
        }
    };

    match lost {
        Some(reason) => {
            warn!("Websocket session lost: {}", reason);
            on_disconnect(&reason);
        }
        None => debug!("Websocket session closed"),
    }
}

fn handle_text(router: &SubscriptionRouter, text: &str) {
    match hyperliquid::decode(text) {
        Ok(WireEvent::Feed(msg)) => {
            if router.dispatch(&msg) == 0 {
                trace!("No subscriber for {} message", msg.kind());
            }
        }
        Ok(WireEvent::SubscriptionAck(ack)) => debug!("Subscription acknowledged: {}", ack),
        Ok(WireEvent::Pong) => trace!("pong"),
        Ok(WireEvent::Ignored(channel)) => trace!("Ignoring channel {}", channel),
        Err(e) => {
            router.record_decode_error();
            warn!("Failed to decode frame: {}", e);
        }
    }
}

/// Live websocket session; closing it stops the runtime thread
pub struct HyperliquidSession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    router: Arc<SubscriptionRouter>,
    thread: Option<JoinHandle<()>>,
    closed: bool,
}

impl PushSession for HyperliquidSession {
    fn subscribe(
        &mut self,
        topic: Topic,
        callback: FeedCallback,
    ) -> Result<SubscriptionId, TransportError> {
        if self.closed {
            return Err(TransportError::SessionClosed);
        }

        // Route first so the first frame after the ack is not lost
        let already_subscribed = self.router.has_topic(&topic);
        let request = hyperliquid::subscribe_request(&topic);
        let id = self.router.add(topic, callback);

        if !already_subscribed && self.cmd_tx.send(Command::Send(request)).is_err() {
            self.router.remove(id);
            return Err(TransportError::SessionClosed);
        }
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError> {
        let topic = self
            .router
            .remove(id)
            .ok_or(TransportError::UnknownSubscription(id.0))?;

        if !self.closed && !self.router.has_topic(&topic) {
            self.cmd_tx
                .send(Command::Send(hyperliquid::unsubscribe_request(&topic)))
                .map_err(|_| TransportError::SessionClosed)?;
        }
        Ok(())
    }

    fn subscription_count(&self) -> usize {
        self.router.len()
    }

    fn error_count(&self) -> u64 {
        self.router.decode_errors() + self.router.callback_panics()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.router.clear();
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(handle) = self.thread.take()
            && handle.thread().id() != thread::current().id()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for HyperliquidSession {
    fn drop(&mut self) {
        self.close();
    }
}

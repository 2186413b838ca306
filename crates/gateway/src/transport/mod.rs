//! Transport abstraction layer
//!
//! A transport opens sessions; a session carries subscriptions. Messages for a
//! subscription are delivered to its callback on the session's own thread, so
//! callbacks must be quick and must not block on the consumer.
//!
//! The trait-based design lets the synchronizer run against the live exchange or
//! against an in-process feed without knowing which.

pub mod channel;
pub mod config;
pub mod router;

use crate::error::TransportError;
use crate::messages::FeedMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Push channel a session can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Level-2 book updates for one instrument
    OrderBook { coin: String },
    /// Fills for one account
    Fills { user: String },
    /// Generic account events (funding, liquidations, exchange cancels)
    AccountEvents { user: String },
}

impl Topic {
    /// Check whether a decoded message belongs to this topic
    pub fn accepts(&self, msg: &FeedMessage) -> bool {
        match (self, msg) {
            (Topic::OrderBook { coin }, FeedMessage::OrderBook(_)) => msg.is_book_for(coin),
            (Topic::Fills { user }, FeedMessage::Fills(batch)) => {
                batch.user.eq_ignore_ascii_case(user)
            }
            // Event payloads carry no user; the session only receives its own
            (Topic::AccountEvents { .. }, FeedMessage::AccountEvent(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::OrderBook { coin } => write!(f, "l2Book.{}", coin),
            Topic::Fills { user } => write!(f, "userFills.{}", user),
            Topic::AccountEvents { user } => write!(f, "userEvents.{}", user),
        }
    }
}

/// Handle returned by `subscribe`, unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Invoked on the transport thread for every message matching a subscription
pub type FeedCallback = Arc<dyn Fn(&FeedMessage) + Send + Sync>;

/// Invoked once, on the transport thread, when a session drops unexpectedly
pub type DisconnectCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Opens sessions against an exchange push feed
pub trait PushTransport: Send + Sync {
    /// Open a new session
    ///
    /// `on_disconnect` fires if the session ends for any reason other than `close()`.
    fn connect(
        &self,
        on_disconnect: DisconnectCallback,
    ) -> Result<Box<dyn PushSession>, TransportError>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// One open connection carrying subscriptions
pub trait PushSession: Send {
    /// Subscribe to a topic; matching messages are delivered to `callback`
    fn subscribe(
        &mut self,
        topic: Topic,
        callback: FeedCallback,
    ) -> Result<SubscriptionId, TransportError>;

    /// Drop a subscription
    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError>;

    /// Number of live subscriptions
    fn subscription_count(&self) -> usize;

    /// Undecodable frames plus panicking callbacks seen by this session
    fn error_count(&self) -> u64 {
        0
    }

    /// Close the session and stop delivering messages; idempotent
    fn close(&mut self);
}

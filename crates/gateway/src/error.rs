//! Error types for the gateway crate

use thiserror::Error;

/// Transport-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscription failed: {0}")]
    Subscribe(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(u64),

    #[error("Timeout waiting for connection")]
    Timeout,
}

/// Errors decoding an exchange payload into a feed message
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid number in field {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid side code: {0}")]
    InvalidSide(String),

    #[error("Exchange reported error: {0}")]
    Exchange(String),
}

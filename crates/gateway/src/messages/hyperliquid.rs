//! Hyperliquid websocket wire format
//!
//! Requests:  `{"method":"subscribe","subscription":{"type":"l2Book","coin":"BTC"}}`
//! Messages:  `{"channel":"l2Book","data":{...}}`, `{"channel":"userFills","data":{...}}`,
//!            `{"channel":"user","data":{...}}` (user events), `{"channel":"pong"}`

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;

use super::{BookMessage, FeedMessage, FillBatch};
use crate::error::DecodeError;
use crate::transport::Topic;
use helm_core::{AccountEvent, BookLevel, Fill, Side};

/// Application-level keepalive; the server answers on the `pong` channel
pub const PING: &str = r#"{"method":"ping"}"#;

/// Result of decoding one text frame
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    Feed(FeedMessage),
    SubscriptionAck(Value),
    Pong,
    /// A channel this gateway does not route
    Ignored(String),
}

#[derive(Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct WireBook {
    coin: String,
    time: u64,
    levels: Vec<Vec<WireLevel>>,
}

#[derive(Deserialize)]
struct WireLevel {
    px: String,
    sz: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFills {
    #[serde(default)]
    is_snapshot: Option<bool>,
    user: String,
    fills: Vec<WireFill>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFill {
    coin: String,
    px: String,
    sz: String,
    side: String,
    time: u64,
    #[serde(default)]
    oid: u64,
    #[serde(default)]
    tid: u64,
    #[serde(default)]
    fee: Option<String>,
    #[serde(default)]
    fee_token: Option<String>,
    #[serde(default)]
    closed_pnl: Option<String>,
    #[serde(default)]
    crossed: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUserEvent {
    #[serde(default)]
    fills: Option<Vec<WireFill>>,
    #[serde(default)]
    funding: Option<WireFunding>,
    #[serde(default)]
    liquidation: Option<WireLiquidation>,
    #[serde(default)]
    non_user_cancel: Option<Vec<WireCancel>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFunding {
    coin: String,
    usdc: String,
    szi: String,
    funding_rate: String,
}

#[derive(Deserialize)]
struct WireLiquidation {
    lid: u64,
    liquidated_ntl_pos: String,
    liquidated_account_value: String,
}

#[derive(Deserialize)]
struct WireCancel {
    coin: String,
}

/// Subscription object for a topic
pub fn subscription(topic: &Topic) -> Value {
    match topic {
        Topic::OrderBook { coin } => json!({ "type": "l2Book", "coin": coin }),
        Topic::Fills { user } => json!({ "type": "userFills", "user": user }),
        Topic::AccountEvents { user } => json!({ "type": "userEvents", "user": user }),
    }
}

pub fn subscribe_request(topic: &Topic) -> String {
    json!({ "method": "subscribe", "subscription": subscription(topic) }).to_string()
}

pub fn unsubscribe_request(topic: &Topic) -> String {
    json!({ "method": "unsubscribe", "subscription": subscription(topic) }).to_string()
}

/// Decode one text frame
pub fn decode(text: &str) -> Result<WireEvent, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.channel.as_str() {
        "l2Book" => {
            let book: WireBook = serde_json::from_value(envelope.data)?;
            Ok(WireEvent::Feed(FeedMessage::OrderBook(decode_book(book)?)))
        }
        "userFills" => {
            let batch: WireFills = serde_json::from_value(envelope.data)?;
            let fills = batch
                .fills
                .into_iter()
                .map(decode_fill)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(WireEvent::Feed(FeedMessage::Fills(FillBatch {
                user: batch.user,
                is_snapshot: batch.is_snapshot.unwrap_or(false),
                fills,
            })))
        }
        "user" => {
            let event: WireUserEvent = serde_json::from_value(envelope.data.clone())?;
            let event = decode_user_event(event, &envelope.data)?;
            Ok(WireEvent::Feed(FeedMessage::AccountEvent(event)))
        }
        "subscriptionResponse" => Ok(WireEvent::SubscriptionAck(envelope.data)),
        "pong" => Ok(WireEvent::Pong),
        "error" => Err(DecodeError::Exchange(
            envelope
                .data
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| envelope.data.to_string()),
        )),
        other => Ok(WireEvent::Ignored(other.to_string())),
    }
}

fn decode_book(book: WireBook) -> Result<BookMessage, DecodeError> {
    let mut sides = book.levels.into_iter();
    let bids = decode_levels(sides.next().unwrap_or_default())?;
    let asks = decode_levels(sides.next().unwrap_or_default())?;

    Ok(BookMessage {
        coin: book.coin,
        time_ms: book.time,
        bids,
        asks,
    })
}

fn decode_levels(levels: Vec<WireLevel>) -> Result<Vec<BookLevel>, DecodeError> {
    levels
        .into_iter()
        .map(|l| Ok(BookLevel::new(decimal("px", &l.px)?, decimal("sz", &l.sz)?)))
        .collect()
}

fn decode_fill(fill: WireFill) -> Result<Fill, DecodeError> {
    let side = Side::from_exchange_code(&fill.side).ok_or(DecodeError::InvalidSide(fill.side))?;

    Ok(Fill {
        coin: fill.coin,
        side,
        price: decimal("px", &fill.px)?,
        size: decimal("sz", &fill.sz)?,
        time_ms: fill.time,
        order_id: fill.oid,
        trade_id: fill.tid,
        fee: optional_decimal("fee", fill.fee.as_deref())?,
        fee_token: fill.fee_token.unwrap_or_default(),
        closed_pnl: optional_decimal("closedPnl", fill.closed_pnl.as_deref())?,
        crossed: fill.crossed,
    })
}

fn decode_user_event(event: WireUserEvent, raw: &Value) -> Result<AccountEvent, DecodeError> {
    if let Some(fills) = event.fills {
        let fills = fills
            .into_iter()
            .map(decode_fill)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AccountEvent::Fills(fills));
    }

    if let Some(funding) = event.funding {
        return Ok(AccountEvent::Funding {
            coin: funding.coin,
            usdc: decimal("usdc", &funding.usdc)?,
            size: decimal("szi", &funding.szi)?,
            funding_rate: decimal("fundingRate", &funding.funding_rate)?,
        });
    }

    if let Some(liq) = event.liquidation {
        return Ok(AccountEvent::Liquidation {
            liquidation_id: liq.lid,
            liquidated_notional: decimal("liquidated_ntl_pos", &liq.liquidated_ntl_pos)?,
            account_value: decimal("liquidated_account_value", &liq.liquidated_account_value)?,
        });
    }

    if let Some(cancels) = event.non_user_cancel {
        return Ok(AccountEvent::NonUserCancel {
            coins: cancels.into_iter().map(|c| c.coin).collect(),
        });
    }

    Ok(AccountEvent::Other(raw.to_string()))
}

fn decimal(field: &'static str, value: &str) -> Result<Decimal, DecodeError> {
    Decimal::from_str(value).map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn optional_decimal(field: &'static str, value: Option<&str>) -> Result<Decimal, DecodeError> {
    match value {
        Some(v) => decimal(field, v),
        None => Ok(Decimal::ZERO),
    }
}

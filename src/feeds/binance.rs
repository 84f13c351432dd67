//! Binance websocket codec and signed order-entry frames.

use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::core::{Error, Quote, Result, Symbol, TimeInForce, Trade};
use crate::execution::order::{CancelRequest, NewRequest};
use crate::feeds::connection::{ParsedFrame, VenueCodec};

/// Request window the counterparty allows before a signed frame is
/// considered stale.
pub const RECV_WINDOW_MILLIS: i64 = 5000;

/// Market-data codec. Symbols normalize to lowercase stream names on
/// the `bookTicker` and `trade` streams.
#[derive(Default)]
pub struct BinanceCodec {
    next_id: AtomicI64,
}

impl BinanceCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn streams(symbol: &Symbol) -> Vec<String> {
        let lower = symbol.as_str().to_lowercase();
        vec![format!("{lower}@bookTicker"), format!("{lower}@trade")]
    }

    fn command(&self, method: &str, symbol: &Symbol) -> Result<String> {
        let command = Command {
            method: method.to_string(),
            params: Self::streams(symbol),
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
        };
        Ok(serde_json::to_string(&command)?)
    }
}

/// A stream command. The id is unique per request.
#[derive(Debug, Serialize, Deserialize)]
struct Command {
    method: String,
    params: Vec<String>,
    id: i64,
}

/// The union of the fields this codec reads off the combined
/// `bookTicker` and `trade` streams. Command responses deserialize to
/// an empty frame and are dropped.
#[derive(Debug, Default, Deserialize)]
struct StreamFrame {
    #[serde(default, rename = "e")]
    event: Option<String>,
    #[serde(default, rename = "s")]
    symbol: Option<String>,
    #[serde(default, rename = "b")]
    bid_px: Option<String>,
    #[serde(default, rename = "B")]
    bid_size: Option<String>,
    #[serde(default, rename = "a")]
    ask_px: Option<String>,
    #[serde(default, rename = "A")]
    ask_size: Option<String>,
    #[serde(default, rename = "t")]
    trade_id: Option<i64>,
    #[serde(default, rename = "p")]
    last_px: Option<String>,
    #[serde(default, rename = "q")]
    last_qty: Option<String>,
}

fn decimal(field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| Error::Parse(format!("{field}: {e}")))
}

impl VenueCodec for BinanceCodec {
    fn subscribe_frame(&self, symbol: &Symbol) -> Result<String> {
        self.command("SUBSCRIBE", symbol)
    }

    fn unsubscribe_frame(&self, symbol: &Symbol) -> Result<String> {
        self.command("UNSUBSCRIBE", symbol)
    }

    fn parse(&self, frame: &str) -> Result<ParsedFrame> {
        let raw: StreamFrame = serde_json::from_str(frame)?;

        if raw.event.as_deref() == Some("trade") {
            let symbol = raw
                .symbol
                .ok_or_else(|| Error::Parse("trade: symbol missing".into()))?;
            let qty = raw
                .last_qty
                .ok_or_else(|| Error::Parse("trade: q missing".into()))?;
            let px = raw
                .last_px
                .ok_or_else(|| Error::Parse("trade: p missing".into()))?;
            let trade = Trade::new(
                Symbol::new(symbol),
                decimal("q", &qty)?,
                decimal("p", &px)?,
            );
            return Ok(ParsedFrame {
                quote: None,
                trades: vec![(trade, raw.trade_id)],
            });
        }

        if let (Some(symbol), Some(bid_px), Some(bid_size), Some(ask_px), Some(ask_size)) = (
            raw.symbol,
            raw.bid_px,
            raw.bid_size,
            raw.ask_px,
            raw.ask_size,
        ) {
            let quote = Quote {
                symbol: Symbol::new(symbol),
                bid_px: decimal("b", &bid_px)?,
                bid_size: decimal("B", &bid_size)?,
                ask_px: decimal("a", &ask_px)?,
                ask_size: decimal("A", &ask_size)?,
            };
            return Ok(ParsedFrame {
                quote: Some(quote),
                trades: Vec::new(),
            });
        }

        // Command responses and anything else this codec does not carry.
        Ok(ParsedFrame::default())
    }
}

fn sign(payload: &str, secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn order_type(time_in_force: TimeInForce) -> &'static str {
    // Resting orders go on the book as maker-only.
    match time_in_force {
        TimeInForce::Gtc => "LIMIT_MAKER",
        TimeInForce::Ioc => "LIMIT",
    }
}

#[derive(Serialize)]
struct OrderFrame<P: Serialize> {
    id: String,
    method: String,
    params: P,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceParams {
    symbol: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    time_in_force: String,
    quantity: String,
    price: String,
    new_client_order_id: String,
    new_order_resp_type: String,
    recv_window: i64,
    timestamp: i64,
    api_key: String,
    signature: String,
}

/// The `order.place` frame for a new-order request, signed with the
/// account secret. Parameters are signed in lexical order.
pub fn new_order_frame(request: &NewRequest, api_key: &str, secret: &str) -> Result<String> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let payload = format!(
        "apiKey={api_key}&newClientOrderId={}&newOrderRespType=ACK&price={}&quantity={}\
         &recvWindow={RECV_WINDOW_MILLIS}&side={}&symbol={}&timeInForce={}&timestamp={timestamp}&type={}",
        request.cl_ord_id,
        request.price,
        request.order_qty,
        request.side,
        request.symbol,
        request.time_in_force,
        order_type(request.time_in_force),
    );
    let frame = OrderFrame {
        id: request.cl_ord_id.clone(),
        method: "order.place".to_string(),
        params: PlaceParams {
            symbol: request.symbol.to_string(),
            side: request.side.to_string(),
            order_type: order_type(request.time_in_force).to_string(),
            time_in_force: request.time_in_force.to_string(),
            quantity: request.order_qty.to_string(),
            price: request.price.to_string(),
            new_client_order_id: request.cl_ord_id.clone(),
            new_order_resp_type: "ACK".to_string(),
            recv_window: RECV_WINDOW_MILLIS,
            timestamp,
            api_key: api_key.to_string(),
            signature: sign(&payload, secret),
        },
    };
    Ok(serde_json::to_string(&frame)?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelParams {
    symbol: String,
    orig_client_order_id: String,
    recv_window: i64,
    timestamp: i64,
    api_key: String,
    signature: String,
}

/// The `order.cancel` frame for a cancel request.
pub fn cancel_order_frame(
    request: &CancelRequest,
    symbol: &Symbol,
    api_key: &str,
    secret: &str,
) -> Result<String> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let payload = format!(
        "apiKey={api_key}&origClientOrderId={}&recvWindow={RECV_WINDOW_MILLIS}\
         &symbol={symbol}&timestamp={timestamp}",
        request.orig_cl_ord_id,
    );
    let frame = OrderFrame {
        id: request.cl_ord_id.clone(),
        method: "order.cancel".to_string(),
        params: CancelParams {
            symbol: symbol.to_string(),
            orig_client_order_id: request.orig_cl_ord_id.clone(),
            recv_window: RECV_WINDOW_MILLIS,
            timestamp,
            api_key: api_key.to_string(),
            signature: sign(&payload, secret),
        },
    };
    Ok(serde_json::to_string(&frame)?)
}

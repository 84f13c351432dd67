//! Coinbase Exchange websocket codec.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Quote, Result, Symbol, Trade};
use crate::feeds::connection::{ParsedFrame, VenueCodec};

/// Codec over the `ticker` channel, which carries the quote and the
/// last trade in one message.
#[derive(Debug, Default)]
pub struct CoinbaseCodec;

impl CoinbaseCodec {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Serialize)]
struct Request {
    #[serde(rename = "type")]
    request_type: String,
    product_ids: Vec<String>,
    channels: Vec<String>,
}

/// The discriminating fields of any inbound message.
#[derive(Debug, Deserialize)]
struct MessageType {
    #[serde(rename = "type", default)]
    message_type: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    product_id: String,
    best_bid: String,
    best_bid_size: String,
    best_ask: String,
    best_ask_size: String,
    last_size: String,
    price: String,
    trade_id: i64,
}

fn decimal(field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| Error::Parse(format!("ticker: {field}: {e}")))
}

impl VenueCodec for CoinbaseCodec {
    fn subscribe_frame(&self, symbol: &Symbol) -> Result<String> {
        let request = Request {
            request_type: "subscribe".into(),
            product_ids: vec![symbol.to_string()],
            channels: vec!["ticker".into()],
        };
        Ok(serde_json::to_string(&request)?)
    }

    fn unsubscribe_frame(&self, symbol: &Symbol) -> Result<String> {
        let request = Request {
            request_type: "unsubscribe".into(),
            product_ids: vec![symbol.to_string()],
            channels: vec!["ticker".into()],
        };
        Ok(serde_json::to_string(&request)?)
    }

    fn parse(&self, frame: &str) -> Result<ParsedFrame> {
        let mt: MessageType = serde_json::from_str(frame)?;
        if mt.message_type == "error" {
            return Err(Error::Parse(format!("ticker: {}", mt.message)));
        }
        if mt.message_type != "ticker" {
            // Subscription confirmations, heartbeats.
            return Ok(ParsedFrame::default());
        }

        let ticker: Ticker = serde_json::from_str(frame)?;
        let quote = Quote {
            symbol: Symbol::new(&ticker.product_id),
            bid_px: decimal("best_bid", &ticker.best_bid)?,
            bid_size: decimal("best_bid_size", &ticker.best_bid_size)?,
            ask_px: decimal("best_ask", &ticker.best_ask)?,
            ask_size: decimal("best_ask_size", &ticker.best_ask_size)?,
        };
        let trade = Trade::new(
            Symbol::new(&ticker.product_id),
            decimal("last_size", &ticker.last_size)?,
            decimal("price", &ticker.price)?,
        );
        Ok(ParsedFrame {
            quote: Some(quote),
            trades: vec![(trade, Some(ticker.trade_id))],
        })
    }
}

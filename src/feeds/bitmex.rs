//! BitMEX websocket codec and REST order entry.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::core::{Error, Quote, Result, Symbol, TimeInForce, Trade};
use crate::execution::order::{CancelRequest, NewRequest, ReplaceRequest};
use crate::feeds::connection::{ParsedFrame, VenueCodec};

/// Seconds a signed request stays valid.
pub const REQUEST_EXPIRY_SECONDS: i64 = 30;

/// Market-data codec over the level-1 `quote` and `trade` tables.
#[derive(Debug, Default)]
pub struct BitmexCodec;

impl BitmexCodec {
    pub fn new() -> Self {
        Self
    }
}

/// A stream command.
#[derive(Debug, Serialize)]
struct Command {
    op: String,
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteTable {
    data: Vec<QuoteRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRow {
    symbol: String,
    bid_size: f64,
    bid_price: f64,
    ask_price: f64,
    ask_size: f64,
}

#[derive(Debug, Deserialize)]
struct TradeTable {
    data: Vec<TradeRow>,
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    symbol: String,
    size: f64,
    price: f64,
}

fn decimal(field: &str, value: f64) -> Result<Decimal> {
    Decimal::try_from(value).map_err(|e| Error::Parse(format!("{field}: {e}")))
}

impl VenueCodec for BitmexCodec {
    fn subscribe_frame(&self, symbol: &Symbol) -> Result<String> {
        let command = Command {
            op: "subscribe".into(),
            args: vec![format!("quote:{symbol}"), format!("trade:{symbol}")],
        };
        Ok(serde_json::to_string(&command)?)
    }

    fn unsubscribe_frame(&self, symbol: &Symbol) -> Result<String> {
        let command = Command {
            op: "unsubscribe".into(),
            args: vec![format!("quote:{symbol}"), format!("trade:{symbol}")],
        };
        Ok(serde_json::to_string(&command)?)
    }

    fn parse(&self, frame: &str) -> Result<ParsedFrame> {
        if frame.starts_with(r#"{"table":"quote""#) {
            let table: QuoteTable = serde_json::from_str(frame)?;
            // The subscription is level 1 only.
            if table.data.len() != 1 {
                return Ok(ParsedFrame::default());
            }
            let row = &table.data[0];
            let quote = Quote {
                symbol: Symbol::new(&row.symbol),
                bid_px: decimal("bidPrice", row.bid_price)?,
                bid_size: decimal("bidSize", row.bid_size)?,
                ask_px: decimal("askPrice", row.ask_price)?,
                ask_size: decimal("askSize", row.ask_size)?,
            };
            return Ok(ParsedFrame {
                quote: Some(quote),
                trades: Vec::new(),
            });
        }

        if frame.starts_with(r#"{"table":"trade""#) {
            let table: TradeTable = serde_json::from_str(frame)?;
            let mut trades = Vec::with_capacity(table.data.len());
            for row in &table.data {
                let trade = Trade::new(
                    Symbol::new(&row.symbol),
                    decimal("size", row.size)?,
                    decimal("price", row.price)?,
                );
                // No trade id on this table; duplicates are not
                // distinguishable and every row is admitted.
                trades.push((trade, None));
            }
            return Ok(ParsedFrame {
                quote: None,
                trades,
            });
        }

        // Welcome banners, subscription acks and other tables.
        Ok(ParsedFrame::default())
    }
}

fn sign(verb: &str, path: &str, expires: &str, body: &str, secret: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(verb.as_bytes());
    mac.update(path.as_bytes());
    mac.update(expires.as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewOrderBody {
    symbol: String,
    order_qty: Decimal,
    price: Decimal,
    #[serde(rename = "clOrdID")]
    cl_ord_id: String,
    ord_type: String,
    time_in_force: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceOrderBody {
    #[serde(rename = "origClOrdID")]
    orig_cl_ord_id: String,
    #[serde(rename = "clOrdID")]
    cl_ord_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_qty: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
}

#[derive(Serialize)]
struct CancelOrderBody {
    #[serde(rename = "clOrdID")]
    cl_ord_id: String,
}

/// REST order entry. Each call builds a signed request against the
/// order endpoint and submits it.
pub struct OrderGateway {
    url: String,
    api_key: String,
    secret: String,
    client: reqwest::Client,
}

impl OrderGateway {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            secret: secret.into(),
            client: reqwest::Client::new(),
        }
    }

    fn time_in_force(time_in_force: TimeInForce) -> &'static str {
        match time_in_force {
            TimeInForce::Gtc => "GoodTillCancel",
            TimeInForce::Ioc => "ImmediateOrCancel",
        }
    }

    async fn submit(&self, method: reqwest::Method, body: String) -> Result<()> {
        let expires = (chrono::Utc::now().timestamp() + REQUEST_EXPIRY_SECONDS).to_string();
        let signature = sign("POST", &self.url, &expires, &body, &self.secret);
        let response = self
            .client
            .request(method, &self.url)
            .header("api-expires", &expires)
            .header("api-key", &self.api_key)
            .header("api-signature", &signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Exchange(format!(
                "order entry: status {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn new_order(&self, request: &NewRequest) -> Result<()> {
        let body = serde_json::to_string(&NewOrderBody {
            symbol: request.symbol.to_string(),
            order_qty: request.order_qty,
            price: request.price,
            cl_ord_id: request.cl_ord_id.clone(),
            ord_type: "Limit".into(),
            time_in_force: Self::time_in_force(request.time_in_force).into(),
        })?;
        self.submit(reqwest::Method::POST, body).await
    }

    pub async fn replace_order(&self, request: &ReplaceRequest) -> Result<()> {
        let body = serde_json::to_string(&ReplaceOrderBody {
            orig_cl_ord_id: request.orig_cl_ord_id.clone(),
            cl_ord_id: request.cl_ord_id.clone(),
            order_qty: request.order_qty,
            price: request.price,
        })?;
        self.submit(reqwest::Method::PUT, body).await
    }

    pub async fn cancel_order(&self, request: &CancelRequest) -> Result<()> {
        // The venue cancels by the ClOrdID the order currently holds.
        let body = serde_json::to_string(&CancelOrderBody {
            cl_ord_id: request.orig_cl_ord_id.clone(),
        })?;
        self.submit(reqwest::Method::DELETE, body).await
    }
}

//! Core market types shared by every layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tradeable symbol (e.g. "BTCUSDT", "XRP-USD").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mint a fresh order identifier, used for both OrderID and ClOrdID.
pub fn new_order_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Time in force. Only the two values the counterparty flow supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    Gtc,
    #[serde(rename = "IOC")]
    Ioc,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
        }
    }
}

/// Instruction message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    New,
    Replace,
    Cancel,
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgType::New => write!(f, "NEW"),
            MsgType::Replace => write!(f, "REPLACE"),
            MsgType::Cancel => write!(f, "CANCEL"),
        }
    }
}

/// Order status as reported to delegates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrdStatus {
    PendingNew,
    New,
    PendingReplace,
    Replaced,
    PendingCancel,
    Canceled,
    PartiallyFilled,
    Filled,
    Expired,
    Rejected,
}

/// Marker placed in [`Report::exec_inst`] when the order has no request
/// in flight and is not IOC: a delegate may act on such a report without
/// racing an outstanding request.
pub const EXEC_INST_ACTIONABLE: &str = "e";

/// An order instruction from the client. Delegate-specific order types
/// embed one of these and expose it through
/// [`crate::runtime::AnyOrder::definition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub msg_type: MsgType,
    pub order_id: String,
    pub side: Side,
    pub symbol: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_qty: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

/// Top of book for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: Symbol,
    pub bid_px: Decimal,
    pub bid_size: Decimal,
    pub ask_px: Decimal,
    pub ask_size: Decimal,
}

impl Quote {
    /// The near touch for the given side: the price a passive order on
    /// that side would join.
    pub fn near(&self, side: Side) -> (Decimal, Decimal) {
        match side {
            Side::Buy => (self.bid_px, self.bid_size),
            Side::Sell => (self.ask_px, self.ask_size),
        }
    }

    /// The far touch for the given side: the price an aggressive order
    /// on that side would cross.
    pub fn far(&self, side: Side) -> (Decimal, Decimal) {
        match side {
            Side::Buy => (self.ask_px, self.ask_size),
            Side::Sell => (self.bid_px, self.bid_size),
        }
    }
}

/// A market trade, possibly the aggregate of several under conflation.
/// `trade_volume` and `avg_px` cover every trade folded into this value,
/// including the one it was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub symbol: Symbol,
    pub last_qty: Decimal,
    pub last_px: Decimal,
    pub trade_volume: Decimal,
    pub avg_px: Decimal,
}

impl Trade {
    pub fn new(symbol: Symbol, last_qty: Decimal, last_px: Decimal) -> Self {
        Self {
            symbol,
            last_qty,
            last_px,
            trade_volume: last_qty,
            avg_px: last_px,
        }
    }

    /// Fold `latest` into this trade: `avg_px` becomes the size-weighted
    /// mean rounded to `decimal_places`, `trade_volume` the sum, and
    /// `last_qty`/`last_px` those of `latest`.
    pub fn aggregate(&mut self, latest: &Trade, decimal_places: u32) {
        let volume = self.trade_volume + latest.trade_volume;
        if !volume.is_zero() {
            let notional =
                self.trade_volume * self.avg_px + latest.trade_volume * latest.avg_px;
            self.avg_px = (notional / volume).round_dp(decimal_places);
        }
        self.trade_volume = volume;
        self.last_qty = latest.last_qty;
        self.last_px = latest.last_px;
    }
}

/// Normalized execution report emitted by the counterparty adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub order_id: String,
    #[serde(default)]
    pub secondary_order_id: String,
    pub cl_ord_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub ord_status: OrdStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_qty: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_px: Option<Decimal>,
    pub transact_time: DateTime<Utc>,
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub exec_inst: String,
}

impl Report {
    /// True when a delegate may act on this report. See
    /// [`EXEC_INST_ACTIONABLE`].
    pub fn actionable(&self) -> bool {
        self.exec_inst == EXEC_INST_ACTIONABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn symbol_is_uppercased() {
        assert_eq!(Symbol::new("btcusdt").as_str(), "BTCUSDT");
    }

    #[test]
    fn quote_near_and_far() {
        let quote = Quote {
            symbol: Symbol::new("A"),
            bid_px: dec!(42),
            bid_size: dec!(100),
            ask_px: dec!(43),
            ask_size: dec!(150),
        };
        assert_eq!(quote.near(Side::Buy), (dec!(42), dec!(100)));
        assert_eq!(quote.far(Side::Buy), (dec!(43), dec!(150)));
        assert_eq!(quote.near(Side::Sell), (dec!(43), dec!(150)));
        assert_eq!(quote.far(Side::Sell), (dec!(42), dec!(100)));
    }

    #[test]
    fn trade_aggregation_is_size_weighted() {
        let mut trade = Trade::new(Symbol::new("A"), dec!(10), dec!(100));
        trade.aggregate(&Trade::new(Symbol::new("A"), dec!(30), dec!(104)), 8);
        assert_eq!(trade.trade_volume, dec!(40));
        assert_eq!(trade.avg_px, dec!(103));
        assert_eq!(trade.last_qty, dec!(30));
        assert_eq!(trade.last_px, dec!(104));
    }

    #[test]
    fn trade_aggregation_rounds_to_precision() {
        let mut trade = Trade::new(Symbol::new("A"), dec!(1), dec!(1));
        trade.aggregate(&Trade::new(Symbol::new("A"), dec!(2), dec!(2)), 2);
        // (1*1 + 2*2) / 3 = 1.666...
        assert_eq!(trade.avg_px, dec!(1.67));
    }

    #[test]
    fn order_round_trip() {
        let order = Order {
            msg_type: MsgType::New,
            order_id: new_order_id(),
            side: Side::Buy,
            symbol: Symbol::new("BTCUSDT"),
            order_qty: Some(dec!(100)),
            price: Some(dec!(42)),
            time_in_force: TimeInForce::Gtc,
        };
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }

    #[test]
    fn report_round_trip() {
        let report = Report {
            order_id: new_order_id(),
            secondary_order_id: "X1".into(),
            cl_ord_id: new_order_id(),
            symbol: Symbol::new("BTCUSDT"),
            side: Side::Sell,
            ord_status: OrdStatus::PartiallyFilled,
            last_qty: Some(dec!(10)),
            last_px: Some(dec!(42.5)),
            transact_time: Utc::now(),
            time_in_force: TimeInForce::Gtc,
            exec_inst: EXEC_INST_ACTIONABLE.into(),
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(report, back);
        assert!(back.actionable());
    }
}

//! FIX-style wire messages.
//!
//! The session layer (logon, heartbeats, resends, sequence numbers) is
//! a separate concern: outbound requests leave through [`FixSender`]
//! and inbound traffic arrives as already-framed [`Inbound`] values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Result, Side, Symbol, TimeInForce};
use crate::execution::order::{CancelRequest, NewRequest, OpenOrder, ReplaceRequest};

/// Execution report ExecType (FIX tag 150).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecType {
    PendingNew,
    New,
    Rejected,
    PendingCancel,
    Canceled,
    Expired,
    PendingReplace,
    Replaced,
    Trade,
    // Values the adapter receives but does not act on.
    Calculated,
    DoneForDay,
    Fill,
    OrderStatus,
    PartialFill,
    Restated,
    Stopped,
    Suspended,
    TradeCancel,
    TradeCorrect,
    TradeInClearingHold,
    TradeReleasedToClearing,
    TriggeredBySystem,
}

/// Which request an order-cancel-reject refers to (FIX tag 434).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CxlRejResponseTo {
    OrderCancelRequest,
    OrderCancelReplaceRequest,
}

/// Inbound execution report, already parsed off the session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub exec_type: ExecType,
    pub cl_ord_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_cl_ord_id: Option<String>,
    /// Counterparty-assigned order identifier (FIX tag 37).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaves_qty: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_qty: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_px: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transact_time: Option<DateTime<Utc>>,
}

/// Inbound order-cancel-reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelReject {
    pub cl_ord_id: String,
    pub orig_cl_ord_id: String,
    pub response_to: CxlRejResponseTo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaves_qty: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transact_time: Option<DateTime<Utc>>,
}

/// Any application-level message from the counterparty.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    ExecutionReport(ExecutionReport),
    OrderCancelReject(OrderCancelReject),
    /// Anything else, carrying its MsgType tag value.
    Other(String),
}

/// Why an inbound message was handed back to the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReject {
    /// BusinessMessageReject, FIX tag 380 reason.
    BusinessMessageReject { ref_tag_id: u16, text: String },
    UnsupportedMessageType,
}

impl SessionReject {
    pub fn business(text: impl Into<String>) -> Self {
        Self::BusinessMessageReject {
            ref_tag_id: 380,
            text: text.into(),
        }
    }
}

impl std::fmt::Display for SessionReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BusinessMessageReject { ref_tag_id, text } => {
                write!(f, "business message reject ({ref_tag_id}): {text}")
            }
            Self::UnsupportedMessageType => write!(f, "unsupported message type"),
        }
    }
}

/// Outbound order-flow messages. Every order is a limit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    NewOrderSingle {
        cl_ord_id: String,
        symbol: Symbol,
        side: Side,
        order_qty: Decimal,
        price: Decimal,
        time_in_force: TimeInForce,
    },
    #[serde(rename_all = "camelCase")]
    OrderCancelReplaceRequest {
        cl_ord_id: String,
        orig_cl_ord_id: String,
        order_id: String,
        symbol: Symbol,
        order_qty: Option<Decimal>,
        price: Option<Decimal>,
    },
    #[serde(rename_all = "camelCase")]
    OrderCancelRequest {
        cl_ord_id: String,
        orig_cl_ord_id: String,
        order_id: String,
        symbol: Symbol,
    },
}

impl Outbound {
    pub fn new_order(request: &NewRequest) -> Self {
        Self::NewOrderSingle {
            cl_ord_id: request.cl_ord_id.clone(),
            symbol: request.symbol.clone(),
            side: request.side,
            order_qty: request.order_qty,
            price: request.price,
            time_in_force: request.time_in_force,
        }
    }

    pub fn replace_order(request: &ReplaceRequest, open: &OpenOrder) -> Self {
        Self::OrderCancelReplaceRequest {
            cl_ord_id: request.cl_ord_id.clone(),
            orig_cl_ord_id: request.orig_cl_ord_id.clone(),
            order_id: open.secondary_order_id.clone(),
            symbol: open.symbol.clone(),
            order_qty: request.order_qty,
            price: request.price,
        }
    }

    pub fn cancel_order(request: &CancelRequest, open: &OpenOrder) -> Self {
        Self::OrderCancelRequest {
            cl_ord_id: request.cl_ord_id.clone(),
            orig_cl_ord_id: request.orig_cl_ord_id.clone(),
            order_id: open.secondary_order_id.clone(),
            symbol: open.symbol.clone(),
        }
    }
}

/// The seam to the counterparty session. Implementations frame and
/// transmit; they do not interpret.
pub trait FixSender: Send + Sync {
    fn send(&self, message: Outbound) -> Result<()>;
}

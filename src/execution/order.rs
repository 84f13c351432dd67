//! Open-order state machine.
//!
//! An [`OpenOrder`] tracks one live order at the counterparty. At most
//! one request may be in flight at a time; the single `pending` slot
//! carries that invariant in the type. Requests are immutable once
//! minted and accept/reject are operations on the owning order, keyed
//! lookups being the caller's concern.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{new_order_id, OrdStatus, Order, Report, Side, Symbol, TimeInForce};

/// The request currently in flight for an [`OpenOrder`], if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingRequest {
    New(NewRequest),
    Replace(ReplaceRequest),
    Cancel(CancelRequest),
}

/// Corresponds to a FIX NewOrderSingle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub cl_ord_id: String,
    pub side: Side,
    pub symbol: Symbol,
    pub order_qty: Decimal,
    pub price: Decimal,
    pub time_in_force: TimeInForce,
}

/// Corresponds to a FIX OrderCancelReplaceRequest. `None` quantities
/// and prices mean unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceRequest {
    pub cl_ord_id: String,
    pub orig_cl_ord_id: String,
    pub order_qty: Option<Decimal>,
    pub price: Option<Decimal>,
}

/// Corresponds to a FIX OrderCancelRequest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub cl_ord_id: String,
    pub orig_cl_ord_id: String,
}

/// The current state of one order at the counterparty. A single
/// client OrderID may own several of these over its lifetime; the
/// counterparty-assigned identifier for each is `secondary_order_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub account: String,
    pub order_id: String,
    pub secondary_order_id: String,
    pub cl_ord_id: String,
    pub side: Side,
    pub symbol: Symbol,
    pub order_qty: Decimal,
    pub price: Decimal,
    pub time_in_force: TimeInForce,
    pending: Option<PendingRequest>,
    pub complete: bool,
}

impl OpenOrder {
    /// An open order for the given instruction definition. Quantity
    /// and price default to zero until the instruction supplies them.
    pub fn new(def: &Order) -> Self {
        Self {
            account: String::new(),
            order_id: def.order_id.clone(),
            secondary_order_id: String::new(),
            cl_ord_id: String::new(),
            side: def.side,
            symbol: def.symbol.clone(),
            order_qty: def.order_qty.unwrap_or_default(),
            price: def.price.unwrap_or_default(),
            time_in_force: def.time_in_force,
            pending: None,
            complete: false,
        }
    }

    /// True while a request is in flight.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn pending_new(&self) -> Option<&NewRequest> {
        match self.pending.as_ref() {
            Some(PendingRequest::New(r)) => Some(r),
            _ => None,
        }
    }

    pub fn pending_replace(&self) -> Option<&ReplaceRequest> {
        match self.pending.as_ref() {
            Some(PendingRequest::Replace(r)) => Some(r),
            _ => None,
        }
    }

    pub fn pending_cancel(&self) -> Option<&CancelRequest> {
        match self.pending.as_ref() {
            Some(PendingRequest::Cancel(r)) => Some(r),
            _ => None,
        }
    }

    /// Mint a [`NewRequest`] if the state allows: nothing in flight,
    /// not complete, never accepted by the counterparty. The fresh
    /// ClOrdID is owned by the order immediately.
    pub fn make_new_request(&mut self) -> Option<NewRequest> {
        if self.complete || self.is_pending() || !self.secondary_order_id.is_empty() {
            return None;
        }
        let request = NewRequest {
            cl_ord_id: new_order_id(),
            side: self.side,
            symbol: self.symbol.clone(),
            order_qty: self.order_qty,
            price: self.price,
            time_in_force: self.time_in_force,
        };
        self.cl_ord_id = request.cl_ord_id.clone();
        self.pending = Some(PendingRequest::New(request.clone()));
        Some(request)
    }

    /// Mint a [`ReplaceRequest`] if the state allows: live at the
    /// counterparty, nothing in flight, and at least one change.
    pub fn make_replace_request(
        &mut self,
        order_qty: Option<Decimal>,
        price: Option<Decimal>,
    ) -> Option<ReplaceRequest> {
        if self.complete || self.is_pending() || self.secondary_order_id.is_empty() {
            return None;
        }
        if order_qty.is_none() && price.is_none() {
            return None;
        }
        let request = ReplaceRequest {
            cl_ord_id: new_order_id(),
            orig_cl_ord_id: self.cl_ord_id.clone(),
            order_qty,
            price,
        };
        self.pending = Some(PendingRequest::Replace(request.clone()));
        Some(request)
    }

    /// Mint a [`CancelRequest`] if the state allows: live at the
    /// counterparty and nothing in flight.
    pub fn make_cancel_request(&mut self) -> Option<CancelRequest> {
        if self.complete || self.is_pending() || self.secondary_order_id.is_empty() {
            return None;
        }
        let request = CancelRequest {
            cl_ord_id: new_order_id(),
            orig_cl_ord_id: self.cl_ord_id.clone(),
        };
        self.pending = Some(PendingRequest::Cancel(request.clone()));
        Some(request)
    }

    /// The counterparty accepted the pending new request. Captures the
    /// counterparty-assigned identifier and clears the slot.
    pub fn accept_new(&mut self, secondary_order_id: &str) -> bool {
        match self.pending.take() {
            Some(PendingRequest::New(_)) => {
                if !secondary_order_id.is_empty() {
                    self.secondary_order_id = secondary_order_id.to_string();
                }
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    /// The counterparty accepted the pending replace. Promotes the
    /// request ClOrdID, applies the new quantity and price, and
    /// returns the ClOrdID the order held before so the caller can
    /// re-key its index.
    pub fn accept_replace(&mut self, secondary_order_id: Option<&str>) -> Option<String> {
        match self.pending.take() {
            Some(PendingRequest::Replace(request)) => {
                let previous = std::mem::replace(&mut self.cl_ord_id, request.cl_ord_id);
                if let Some(id) = secondary_order_id {
                    if !id.is_empty() {
                        self.secondary_order_id = id.to_string();
                    }
                }
                if let Some(qty) = request.order_qty {
                    self.order_qty = qty;
                }
                if let Some(px) = request.price {
                    self.price = px;
                }
                Some(previous)
            }
            other => {
                self.pending = other;
                None
            }
        }
    }

    /// The counterparty accepted the pending cancel. Promotes the
    /// request ClOrdID and marks the order terminal.
    pub fn accept_cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(PendingRequest::Cancel(request)) => {
                self.cl_ord_id = request.cl_ord_id;
                self.complete = true;
                true
            }
            other => {
                self.pending = other;
                false
            }
        }
    }

    /// The counterparty rejected whatever is in flight. Clears the
    /// slot without touching the ClOrdID. A rejected new request is a
    /// terminal transition.
    pub fn reject_pending(&mut self) -> Option<PendingRequest> {
        let rejected = self.pending.take();
        if matches!(rejected, Some(PendingRequest::New(_))) {
            self.complete = true;
        }
        rejected
    }

    /// Terminal fill.
    pub fn mark_filled(&mut self) {
        self.complete = true;
    }

    /// Terminal IOC expiry.
    pub fn mark_expired(&mut self) {
        self.complete = true;
    }

    /// A report skeleton for this order; the caller assigns status,
    /// fill fields and the exec-inst marker.
    pub fn draft_report(&self, ord_status: OrdStatus, transact_time: DateTime<Utc>) -> Report {
        Report {
            order_id: self.order_id.clone(),
            secondary_order_id: self.secondary_order_id.clone(),
            cl_ord_id: self.cl_ord_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            ord_status,
            last_qty: None,
            last_px: None,
            transact_time,
            time_in_force: self.time_in_force,
            exec_inst: String::new(),
        }
    }

    /// Apply a normalized report to a delegate-side mirror of the
    /// order. The counterparty adapter keeps the authoritative copy;
    /// this keeps a delegate's view in step from the report stream.
    pub fn apply(&mut self, report: &Report) {
        match report.ord_status {
            OrdStatus::New => {
                self.accept_new(&report.secondary_order_id);
            }
            OrdStatus::Replaced => {
                self.accept_replace(Some(&report.secondary_order_id));
            }
            OrdStatus::Canceled => {
                self.accept_cancel();
            }
            OrdStatus::Filled => self.mark_filled(),
            OrdStatus::Expired => self.mark_expired(),
            OrdStatus::Rejected => {
                self.reject_pending();
            }
            OrdStatus::PendingNew => {
                if !report.secondary_order_id.is_empty() {
                    self.secondary_order_id = report.secondary_order_id.clone();
                }
            }
            OrdStatus::PartiallyFilled
            | OrdStatus::PendingReplace
            | OrdStatus::PendingCancel => {}
        }
    }
}

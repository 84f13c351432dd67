//! The counterparty application adapter.
//!
//! Translates outbound requests into wire messages and inbound
//! execution reports into state-machine transitions, emitting one
//! normalized [`Report`] per meaningful transition. Open orders are
//! held in an arena indexed both by current ClOrdID and by client
//! OrderID; a replace acceptance re-keys the ClOrdID index atomically.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::warn;

use crate::core::{
    Error, OrdStatus, Report, Result, TimeInForce, EXEC_INST_ACTIONABLE,
};
use crate::execution::messages::{
    CxlRejResponseTo, ExecType, ExecutionReport, FixSender, Inbound, OrderCancelReject, Outbound,
    SessionReject,
};
use crate::execution::order::{CancelRequest, NewRequest, OpenOrder, ReplaceRequest};
use crate::runtime::Reporter;

pub struct Application {
    state: Mutex<Indexes>,
    sender: Arc<dyn FixSender>,
    reporter: Reporter,
}

#[derive(Default)]
struct Indexes {
    next: u64,
    orders: HashMap<u64, OpenOrder>,
    by_cl_ord_id: HashMap<String, u64>,
    by_order_id: HashMap<String, Vec<u64>>,
}

impl Indexes {
    fn insert(&mut self, open: OpenOrder) -> u64 {
        let key = self.next;
        self.next += 1;
        self.by_cl_ord_id.insert(open.cl_ord_id.clone(), key);
        self.by_order_id
            .entry(open.order_id.clone())
            .or_default()
            .push(key);
        self.orders.insert(key, open);
        key
    }

    fn lookup(&self, cl_ord_id: &str) -> Option<u64> {
        self.by_cl_ord_id.get(cl_ord_id).copied()
    }

    /// Move the ClOrdID index entry after a replace acceptance.
    fn rekey(&mut self, previous: &str, current: &str, key: u64) {
        self.by_cl_ord_id.remove(previous);
        self.by_cl_ord_id.insert(current.to_string(), key);
    }

    fn remove(&mut self, key: u64) {
        let Some(open) = self.orders.remove(&key) else {
            return;
        };
        self.by_cl_ord_id.retain(|_, k| *k != key);
        let emptied = match self.by_order_id.get_mut(&open.order_id) {
            Some(keys) => {
                keys.retain(|k| *k != key);
                keys.is_empty()
            }
            None => false,
        };
        if emptied {
            self.by_order_id.remove(&open.order_id);
        }
    }

    /// The act-on marker for reports referencing `order_id`: set only
    /// when none of its open orders has a request in flight and none
    /// is IOC.
    fn exec_inst(&self, order_id: &str) -> String {
        for key in self.by_order_id.get(order_id).into_iter().flatten() {
            if let Some(open) = self.orders.get(key) {
                if open.is_pending() || open.time_in_force == TimeInForce::Ioc {
                    return String::new();
                }
            }
        }
        EXEC_INST_ACTIONABLE.to_string()
    }
}

impl Application {
    pub fn new(sender: Arc<dyn FixSender>, reporter: Reporter) -> Self {
        Self {
            state: Mutex::new(Indexes::default()),
            sender,
            reporter,
        }
    }

    /// Register the open order and send its new-order request. The
    /// order is indexed before the wire send so the acknowledgement
    /// cannot race the registration.
    pub fn send_new(&self, mut open: OpenOrder) -> Result<NewRequest> {
        let request = open
            .make_new_request()
            .ok_or_else(|| Error::RequestConflict(open.order_id.clone()))?;
        self.state.lock().insert(open);
        self.sender.send(Outbound::new_order(&request))?;
        Ok(request)
    }

    /// Send a replace for the order currently keyed by `orig_cl_ord_id`.
    pub fn send_replace(
        &self,
        orig_cl_ord_id: &str,
        order_qty: Option<Decimal>,
        price: Option<Decimal>,
    ) -> Result<ReplaceRequest> {
        let message;
        let request;
        {
            let mut state = self.state.lock();
            let key = state
                .lookup(orig_cl_ord_id)
                .ok_or_else(|| Error::OrigClOrdIdNotFound(orig_cl_ord_id.to_string()))?;
            let open = state.orders.get_mut(&key).expect("indexed order");
            request = open
                .make_replace_request(order_qty, price)
                .ok_or_else(|| Error::RequestConflict(open.order_id.clone()))?;
            message = Outbound::replace_order(&request, open);
        }
        self.sender.send(message)?;
        Ok(request)
    }

    /// Send a cancel for the order currently keyed by `orig_cl_ord_id`.
    pub fn send_cancel(&self, orig_cl_ord_id: &str) -> Result<CancelRequest> {
        let message;
        let request;
        {
            let mut state = self.state.lock();
            let key = state
                .lookup(orig_cl_ord_id)
                .ok_or_else(|| Error::OrigClOrdIdNotFound(orig_cl_ord_id.to_string()))?;
            let open = state.orders.get_mut(&key).expect("indexed order");
            request = open
                .make_cancel_request()
                .ok_or_else(|| Error::RequestConflict(open.order_id.clone()))?;
            message = Outbound::cancel_order(&request, open);
        }
        self.sender.send(message)?;
        Ok(request)
    }

    /// A copy of the open order currently keyed by `cl_ord_id`.
    pub fn open_order(&self, cl_ord_id: &str) -> Option<OpenOrder> {
        let state = self.state.lock();
        let key = state.lookup(cl_ord_id)?;
        state.orders.get(&key).cloned()
    }

    /// Interpret one inbound message, emitting any resulting reports.
    pub async fn on_message(
        &self,
        message: Inbound,
    ) -> std::result::Result<(), SessionReject> {
        let reports = self.apply(message)?;
        for report in reports {
            self.reporter.on_report(report).await;
        }
        Ok(())
    }

    /// Apply the message to the indexed orders under the lock and
    /// return the reports to emit. Reports are sent after the lock is
    /// released.
    fn apply(&self, message: Inbound) -> std::result::Result<Vec<Report>, SessionReject> {
        match message {
            Inbound::ExecutionReport(er) => self.apply_execution_report(er),
            Inbound::OrderCancelReject(ocr) => Ok(self.apply_order_cancel_reject(ocr)),
            Inbound::Other(_) => Err(SessionReject::UnsupportedMessageType),
        }
    }

    fn apply_execution_report(
        &self,
        er: ExecutionReport,
    ) -> std::result::Result<Vec<Report>, SessionReject> {
        let now = er.transact_time.unwrap_or_else(Utc::now);
        let mut state = self.state.lock();

        match er.exec_type {
            ExecType::PendingNew => {
                // Not every counterparty sends this; those that do may
                // already carry the counterparty order identifier.
                let key = state
                    .lookup(&er.cl_ord_id)
                    .ok_or_else(|| SessionReject::business("ClOrdID not known"))?;
                let open = state.orders.get_mut(&key).expect("indexed order");
                if let Some(id) = er.order_id.as_deref() {
                    open.secondary_order_id = id.to_string();
                }
                // The order is itself pending: no act-on marker.
                Ok(vec![open.draft_report(OrdStatus::PendingNew, now)])
            }

            ExecType::New => {
                let key = state
                    .lookup(&er.cl_ord_id)
                    .ok_or_else(|| SessionReject::business("ClOrdID not known"))?;
                let open = state.orders.get_mut(&key).expect("indexed order");
                if open.pending_new().is_none() {
                    return Err(SessionReject::business("Order not PENDING_NEW"));
                }
                open.accept_new(er.order_id.as_deref().unwrap_or(""));
                let mut report = open.draft_report(OrdStatus::New, now);
                let order_id = open.order_id.clone();
                report.exec_inst = state.exec_inst(&order_id);
                Ok(vec![report])
            }

            ExecType::Rejected => {
                let key = state
                    .lookup(&er.cl_ord_id)
                    .ok_or_else(|| SessionReject::business("ClOrdID not known"))?;
                let open = state.orders.get_mut(&key).expect("indexed order");
                if open.pending_new().is_some() {
                    open.reject_pending();
                }
                let mut report = open.draft_report(OrdStatus::Rejected, now);
                report.cl_ord_id = er.cl_ord_id.clone();
                let order_id = open.order_id.clone();
                state.remove(key);
                report.exec_inst = state.exec_inst(&order_id);
                Ok(vec![report])
            }

            ExecType::PendingCancel => {
                let orig = er
                    .orig_cl_ord_id
                    .as_deref()
                    .ok_or_else(|| SessionReject::business("OrigClOrdID not present"))?;
                let key = state
                    .lookup(orig)
                    .ok_or_else(|| SessionReject::business("OrigClOrdID not known"))?;
                let open = state.orders.get(&key).expect("indexed order");
                if open.pending_cancel().is_none() {
                    return Err(SessionReject::business("Order not PENDING_CANCEL"));
                }
                Ok(vec![open.draft_report(OrdStatus::PendingCancel, now)])
            }

            ExecType::Canceled => {
                let orig = er
                    .orig_cl_ord_id
                    .as_deref()
                    .ok_or_else(|| SessionReject::business("OrigClOrdID not present"))?;
                let key = state
                    .lookup(orig)
                    .ok_or_else(|| SessionReject::business("OrigClOrdID not known"))?;
                let open = state.orders.get_mut(&key).expect("indexed order");
                if open.pending_cancel().is_none() {
                    return Err(SessionReject::business("Order not PENDING_CANCEL"));
                }
                open.accept_cancel();
                let mut report = open.draft_report(OrdStatus::Canceled, now);
                let order_id = open.order_id.clone();
                state.remove(key);
                report.exec_inst = state.exec_inst(&order_id);
                Ok(vec![report])
            }

            ExecType::Expired => {
                let key = state
                    .lookup(&er.cl_ord_id)
                    .ok_or_else(|| SessionReject::business("ClOrdID not known"))?;
                let open = state.orders.get_mut(&key).expect("indexed order");
                if open.time_in_force != TimeInForce::Ioc {
                    return Err(SessionReject::business("Cannot expire GTC"));
                }
                open.mark_expired();
                let mut report = open.draft_report(OrdStatus::Expired, now);
                let order_id = open.order_id.clone();
                state.remove(key);
                report.exec_inst = state.exec_inst(&order_id);
                Ok(vec![report])
            }

            ExecType::PendingReplace => {
                let key = state
                    .lookup(&er.cl_ord_id)
                    .ok_or_else(|| SessionReject::business("ClOrdID not known"))?;
                let open = state.orders.get(&key).expect("indexed order");
                if open.pending_replace().is_none() {
                    return Err(SessionReject::business("Order not PENDING_REPLACE"));
                }
                Ok(vec![open.draft_report(OrdStatus::PendingReplace, now)])
            }

            ExecType::Replaced => {
                let key = state
                    .lookup(&er.cl_ord_id)
                    .ok_or_else(|| SessionReject::business("ClOrdID not known"))?;
                let open = state.orders.get_mut(&key).expect("indexed order");
                if open.pending_replace().is_none() {
                    return Err(SessionReject::business("Order not PENDING_REPLACE"));
                }
                let previous = open
                    .accept_replace(er.order_id.as_deref())
                    .expect("pending replace");
                let status = derive_status(er.leaves_qty, open.order_qty);
                let mut report = open.draft_report(status, now);
                let current = open.cl_ord_id.clone();
                let order_id = open.order_id.clone();
                state.rekey(&previous, &current, key);
                report.exec_inst = state.exec_inst(&order_id);
                Ok(vec![report])
            }

            ExecType::Trade => {
                let key = state
                    .lookup(&er.cl_ord_id)
                    .ok_or_else(|| SessionReject::business("ClOrdID not known"))?;
                let last_qty = er
                    .last_qty
                    .ok_or_else(|| SessionReject::business("LastQty not present"))?;
                let last_px = er
                    .last_px
                    .ok_or_else(|| SessionReject::business("LastPx not present"))?;
                let open = state.orders.get_mut(&key).expect("indexed order");
                let status = derive_status(er.leaves_qty, open.order_qty);
                let mut report = open.draft_report(status, now);
                report.last_qty = Some(last_qty);
                report.last_px = Some(last_px);
                let order_id = open.order_id.clone();
                report.exec_inst = state.exec_inst(&order_id);
                if status == OrdStatus::Filled {
                    state
                        .orders
                        .get_mut(&key)
                        .expect("indexed order")
                        .mark_filled();
                    state.remove(key);
                }
                Ok(vec![report])
            }

            // Values outside the supported flow are ignored.
            ExecType::Calculated
            | ExecType::DoneForDay
            | ExecType::Fill
            | ExecType::OrderStatus
            | ExecType::PartialFill
            | ExecType::Restated
            | ExecType::Stopped
            | ExecType::Suspended
            | ExecType::TradeCancel
            | ExecType::TradeCorrect
            | ExecType::TradeInClearingHold
            | ExecType::TradeReleasedToClearing
            | ExecType::TriggeredBySystem => Ok(Vec::new()),
        }
    }

    fn apply_order_cancel_reject(&self, ocr: OrderCancelReject) -> Vec<Report> {
        let now = ocr.transact_time.unwrap_or_else(Utc::now);
        let mut state = self.state.lock();

        let Some(key) = state.lookup(&ocr.orig_cl_ord_id) else {
            warn!(orig_cl_ord_id = %ocr.orig_cl_ord_id, "cancel reject for unknown order");
            return Vec::new();
        };
        let open = state.orders.get_mut(&key).expect("indexed order");

        let cleared = match ocr.response_to {
            CxlRejResponseTo::OrderCancelReplaceRequest => {
                open.pending_replace().is_some() && open.reject_pending().is_some()
            }
            CxlRejResponseTo::OrderCancelRequest => {
                open.pending_cancel().is_some() && open.reject_pending().is_some()
            }
        };
        if !cleared {
            warn!(orig_cl_ord_id = %ocr.orig_cl_ord_id, "cancel reject for order with no matching pending request");
            return Vec::new();
        }

        let status = derive_status(ocr.leaves_qty, open.order_qty);
        let mut report = open.draft_report(status, now);
        let order_id = open.order_id.clone();
        report.exec_inst = state.exec_inst(&order_id);
        vec![report]
    }
}

/// Order status implied by the remaining quantity: nothing left is
/// filled, something less than the full quantity is a partial fill,
/// and the full quantity (or an absent field) leaves the order live.
fn derive_status(leaves_qty: Option<Decimal>, order_qty: Decimal) -> OrdStatus {
    match leaves_qty {
        Some(leaves) if leaves.is_zero() => OrdStatus::Filled,
        Some(leaves) if leaves < order_qty => OrdStatus::PartiallyFilled,
        _ => OrdStatus::New,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{new_order_id, MsgType, Order, Side, Symbol};
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    struct MockSender(Mutex<Vec<Outbound>>);

    impl FixSender for MockSender {
        fn send(&self, message: Outbound) -> Result<()> {
            self.0.lock().push(message);
            Ok(())
        }
    }

    struct Fixture {
        application: Application,
        sender: Arc<MockSender>,
        reporter: Reporter,
        reports: mpsc::Receiver<Report>,
    }

    fn fixture() -> Fixture {
        let sender = Arc::new(MockSender(Mutex::new(Vec::new())));
        let (reporter, reports) = Reporter::channel();
        let application = Application::new(sender.clone(), reporter.clone());
        Fixture {
            application,
            sender,
            reporter,
            reports,
        }
    }

    impl Fixture {
        async fn next_report(&mut self) -> Report {
            let report = self.reports.recv().await.expect("report");
            self.reporter.acknowledge();
            report
        }
    }

    fn definition(time_in_force: TimeInForce) -> Order {
        Order {
            msg_type: MsgType::New,
            order_id: new_order_id(),
            side: Side::Buy,
            symbol: Symbol::new("X"),
            order_qty: Some(dec!(100)),
            price: Some(dec!(42)),
            time_in_force,
        }
    }

    fn execution_report(exec_type: ExecType, cl_ord_id: &str) -> ExecutionReport {
        ExecutionReport {
            exec_type,
            cl_ord_id: cl_ord_id.to_string(),
            orig_cl_ord_id: None,
            order_id: None,
            leaves_qty: None,
            last_qty: None,
            last_px: None,
            transact_time: None,
        }
    }

    #[tokio::test]
    async fn gtc_happy_path() {
        let mut f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();
        assert!(matches!(
            f.sender.0.lock()[0],
            Outbound::NewOrderSingle { .. }
        ));

        let mut pending = execution_report(ExecType::PendingNew, &request.cl_ord_id);
        pending.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(pending))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::PendingNew);
        assert_eq!(report.secondary_order_id, "S1");
        assert_eq!(report.exec_inst, "");

        let mut new = execution_report(ExecType::New, &request.cl_ord_id);
        new.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(new))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::New);
        assert_eq!(report.exec_inst, EXEC_INST_ACTIONABLE);

        let open = f.application.open_order(&request.cl_ord_id).unwrap();
        assert!(!open.is_pending());
        assert_eq!(open.secondary_order_id, "S1");
    }

    #[tokio::test]
    async fn ioc_expiry_removes_the_order() {
        let mut f = fixture();
        let def = definition(TimeInForce::Ioc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        let mut new = execution_report(ExecType::New, &request.cl_ord_id);
        new.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(new))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::New);
        // The order itself is IOC: never actionable.
        assert_eq!(report.exec_inst, "");

        f.application
            .on_message(Inbound::ExecutionReport(execution_report(
                ExecType::Expired,
                &request.cl_ord_id,
            )))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::Expired);
        assert_eq!(report.exec_inst, EXEC_INST_ACTIONABLE);

        assert!(f.application.open_order(&request.cl_ord_id).is_none());
    }

    #[tokio::test]
    async fn expiring_a_gtc_is_rejected() {
        let f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        let reject = f
            .application
            .on_message(Inbound::ExecutionReport(execution_report(
                ExecType::Expired,
                &request.cl_ord_id,
            )))
            .await
            .unwrap_err();
        assert_eq!(reject, SessionReject::business("Cannot expire GTC"));
    }

    #[tokio::test]
    async fn reject_on_pending_new_is_terminal() {
        let mut f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        let mut pending = execution_report(ExecType::PendingNew, &request.cl_ord_id);
        pending.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(pending))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::PendingNew);
        assert_eq!(report.exec_inst, "");

        f.application
            .on_message(Inbound::ExecutionReport(execution_report(
                ExecType::Rejected,
                &request.cl_ord_id,
            )))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::Rejected);
        assert_eq!(report.exec_inst, EXEC_INST_ACTIONABLE);

        assert!(f.application.open_order(&request.cl_ord_id).is_none());
    }

    #[tokio::test]
    async fn replace_round_trip_rotates_cl_ord_id() {
        let mut f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        let mut new = execution_report(ExecType::New, &request.cl_ord_id);
        new.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(new))
            .await
            .unwrap();
        f.next_report().await;

        let replace = f
            .application
            .send_replace(&request.cl_ord_id, Some(dec!(200)), None)
            .unwrap();
        assert!(matches!(
            f.sender.0.lock()[1],
            Outbound::OrderCancelReplaceRequest { .. }
        ));

        f.application
            .on_message(Inbound::ExecutionReport(execution_report(
                ExecType::PendingReplace,
                &request.cl_ord_id,
            )))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::PendingReplace);
        assert_eq!(report.exec_inst, "");

        let mut replaced = execution_report(ExecType::Replaced, &request.cl_ord_id);
        replaced.leaves_qty = Some(dec!(200));
        f.application
            .on_message(Inbound::ExecutionReport(replaced))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::New);
        assert_eq!(report.exec_inst, EXEC_INST_ACTIONABLE);

        // The index has rotated to the replace request's ClOrdID.
        assert!(f.application.open_order(&request.cl_ord_id).is_none());
        let open = f.application.open_order(&replace.cl_ord_id).unwrap();
        assert_eq!(open.order_qty, dec!(200));
        assert!(!open.is_pending());
    }

    #[tokio::test]
    async fn cancel_reject_restores_the_live_order() {
        let mut f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        let mut new = execution_report(ExecType::New, &request.cl_ord_id);
        new.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(new))
            .await
            .unwrap();
        f.next_report().await;

        let cancel = f.application.send_cancel(&request.cl_ord_id).unwrap();
        assert!(matches!(
            f.sender.0.lock()[1],
            Outbound::OrderCancelRequest { .. }
        ));

        f.application
            .on_message(Inbound::OrderCancelReject(OrderCancelReject {
                cl_ord_id: cancel.cl_ord_id.clone(),
                orig_cl_ord_id: request.cl_ord_id.clone(),
                response_to: CxlRejResponseTo::OrderCancelRequest,
                leaves_qty: Some(dec!(100)),
                transact_time: None,
            }))
            .await
            .unwrap();
        let report = f.next_report().await;
        // LeavesQty equals OrderQty: the order is still live and New.
        assert_eq!(report.ord_status, OrdStatus::New);
        assert_eq!(report.exec_inst, EXEC_INST_ACTIONABLE);

        let open = f.application.open_order(&request.cl_ord_id).unwrap();
        assert!(!open.is_pending());
    }

    #[tokio::test]
    async fn cancel_accept_removes_the_order() {
        let mut f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        let mut new = execution_report(ExecType::New, &request.cl_ord_id);
        new.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(new))
            .await
            .unwrap();
        f.next_report().await;

        f.application.send_cancel(&request.cl_ord_id).unwrap();

        let mut canceled = execution_report(ExecType::Canceled, "ignored");
        canceled.orig_cl_ord_id = Some(request.cl_ord_id.clone());
        f.application
            .on_message(Inbound::ExecutionReport(canceled))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::Canceled);
        assert_eq!(report.exec_inst, EXEC_INST_ACTIONABLE);
        assert!(f.application.open_order(&request.cl_ord_id).is_none());
    }

    #[tokio::test]
    async fn fills_derive_status_from_leaves_qty() {
        let mut f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        let mut new = execution_report(ExecType::New, &request.cl_ord_id);
        new.order_id = Some("S1".into());
        f.application
            .on_message(Inbound::ExecutionReport(new))
            .await
            .unwrap();
        f.next_report().await;

        let mut partial = execution_report(ExecType::Trade, &request.cl_ord_id);
        partial.leaves_qty = Some(dec!(60));
        partial.last_qty = Some(dec!(40));
        partial.last_px = Some(dec!(42));
        f.application
            .on_message(Inbound::ExecutionReport(partial))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::PartiallyFilled);
        assert_eq!(report.last_qty, Some(dec!(40)));
        assert_eq!(report.exec_inst, EXEC_INST_ACTIONABLE);

        let mut fill = execution_report(ExecType::Trade, &request.cl_ord_id);
        fill.leaves_qty = Some(dec!(0));
        fill.last_qty = Some(dec!(60));
        fill.last_px = Some(dec!(42));
        f.application
            .on_message(Inbound::ExecutionReport(fill))
            .await
            .unwrap();
        let report = f.next_report().await;
        assert_eq!(report.ord_status, OrdStatus::Filled);
        assert!(f.application.open_order(&request.cl_ord_id).is_none());
    }

    #[tokio::test]
    async fn unknown_cl_ord_id_is_a_business_reject() {
        let f = fixture();
        let reject = f
            .application
            .on_message(Inbound::ExecutionReport(execution_report(
                ExecType::New,
                "nobody",
            )))
            .await
            .unwrap_err();
        assert_eq!(reject, SessionReject::business("ClOrdID not known"));
    }

    #[tokio::test]
    async fn unsupported_exec_types_are_ignored() {
        let f = fixture();
        let def = definition(TimeInForce::Gtc);
        let request = f.application.send_new(OpenOrder::new(&def)).unwrap();

        for exec_type in [
            ExecType::Calculated,
            ExecType::DoneForDay,
            ExecType::OrderStatus,
            ExecType::Restated,
            ExecType::TradeCorrect,
        ] {
            f.application
                .on_message(Inbound::ExecutionReport(execution_report(
                    exec_type,
                    &request.cl_ord_id,
                )))
                .await
                .unwrap();
        }
        assert!(f.application.open_order(&request.cl_ord_id).is_some());
    }

    #[tokio::test]
    async fn unknown_msg_type_is_unsupported() {
        let f = fixture();
        let reject = f
            .application
            .on_message(Inbound::Other("AB".into()))
            .await
            .unwrap_err();
        assert_eq!(reject, SessionReject::UnsupportedMessageType);
    }

    #[tokio::test]
    async fn replace_requires_an_indexed_order() {
        let f = fixture();
        let err = f
            .application
            .send_replace("nobody", Some(dec!(1)), None)
            .unwrap_err();
        assert!(matches!(err, Error::OrigClOrdIdNotFound(_)));
        let err = f.application.send_cancel("nobody").unwrap_err();
        assert!(matches!(err, Error::OrigClOrdIdNotFound(_)));
    }
}

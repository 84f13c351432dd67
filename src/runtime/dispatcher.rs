//! The dispatcher owns the universe of open orders and routes
//! everything to them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::conflate::ConflatingQueue;
use crate::core::{Error, MsgType, Order, Quote, Report, Symbol, Trade};
use crate::feeds::Subscribable;
use crate::runtime::handler::Handler;
use crate::runtime::journal::{self, Journal};
use crate::runtime::{AnyOrder, DelegateFactory, Reporter, Ticker};

/// Capacity of the handler-completion channel. Large enough that a
/// burst of completing handlers does not stall on the selection loop.
const COMPLETED_CAPACITY: usize = 1024;

/// Where the dispatcher records non-fatal faults, with OrderID context.
pub type ErrorSink = Box<dyn Fn(&str, Error) + Send>;

/// What the dispatcher keeps per live order. The handler task itself
/// runs as a peer; the queue is the only shared structure.
struct Process {
    definition: Order,
    queue: Arc<ConflatingQueue<(), Ticker>>,
}

/// Single-owner router. All of its maps are mutated only from its own
/// `run` loop; handlers communicate back through the completion
/// channel.
pub struct Dispatcher<T: AnyOrder> {
    instructions: mpsc::Receiver<T>,
    factory: Arc<dyn DelegateFactory<T>>,
    reports: mpsc::Receiver<Report>,
    reporter: Reporter,
    subscriber: Arc<dyn Subscribable>,
    quotes: Arc<ConflatingQueue<Symbol, Quote>>,
    trades: Arc<ConflatingQueue<Symbol, Trade>>,
    on_error: ErrorSink,
    journal: Arc<dyn Journal>,

    by_order_id: HashMap<String, Process>,
    by_symbol: HashMap<Symbol, Vec<String>>,
    completed_tx: mpsc::Sender<String>,
    completed_rx: mpsc::Receiver<String>,
    handlers: JoinSet<()>,
}

impl<T: AnyOrder> Dispatcher<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instructions: mpsc::Receiver<T>,
        factory: Arc<dyn DelegateFactory<T>>,
        reports: mpsc::Receiver<Report>,
        reporter: Reporter,
        subscriber: Arc<dyn Subscribable>,
        quotes: Arc<ConflatingQueue<Symbol, Quote>>,
        trades: Arc<ConflatingQueue<Symbol, Trade>>,
        on_error: ErrorSink,
        journal: Arc<dyn Journal>,
    ) -> Self {
        let (completed_tx, completed_rx) = mpsc::channel(COMPLETED_CAPACITY);
        Self {
            instructions,
            factory,
            reports,
            reporter,
            subscriber,
            quotes,
            trades,
            on_error,
            journal,
            by_order_id: HashMap::new(),
            by_symbol: HashMap::new(),
            completed_tx,
            completed_rx,
            handlers: JoinSet::new(),
        }
    }

    /// Dispatch until the token is cancelled. Cancellation means
    /// dispatching must stop, not that orders are cancelled; the
    /// handlers observe the same signal through child tokens and are
    /// joined before this returns.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    while self.handlers.join_next().await.is_some() {}
                    info!("dispatcher stopped");
                    return;
                }
                Some(order_id) = self.completed_rx.recv() => {
                    self.remove_order(&order_id).await;
                }
                Some(order) = self.instructions.recv() => {
                    self.handle_instruction(&token, order).await;
                }
                Some(report) = self.reports.recv() => {
                    self.handle_report(report).await;
                    self.reporter.acknowledge();
                }
                _ = self.quotes.ready() => {
                    while let Some(quote) = self.quotes.pop() {
                        let symbol = quote.symbol.clone();
                        self.fan_out(&symbol, Ticker::from_quote(quote));
                    }
                }
                _ = self.trades.ready() => {
                    while let Some(trade) = self.trades.pop() {
                        let symbol = trade.symbol.clone();
                        self.fan_out(&symbol, Ticker::from_trade(trade));
                    }
                }
            }
        }
    }

    async fn handle_instruction(&mut self, token: &CancellationToken, order: T) {
        let def = order.definition().clone();

        let Some(process) = self.by_order_id.get(&def.order_id) else {
            // Unknown order: it must present as New.
            if def.msg_type != MsgType::New {
                (self.on_error)(&def.order_id, Error::ExpectedNew(def.order_id.clone()));
                return;
            }
            self.spawn_order(token, order, def).await;
            return;
        };

        // An existing order, but check it matches first.
        if def.msg_type == MsgType::New {
            (self.on_error)(&def.order_id, Error::DuplicateNew(def.order_id.clone()));
            return;
        }
        let registered = &process.definition;
        if registered.side != def.side || registered.symbol != def.symbol {
            (self.on_error)(
                &def.order_id,
                Error::DefinitionMismatch(def.order_id.clone()),
            );
            return;
        }

        if def.msg_type == MsgType::Cancel {
            self.remove_order(&def.order_id).await;
        }

        // Append to the order's instruction stream regardless, so the
        // handler (which may outlive the mapping) observes the
        // instruction. The journal is not bound to the shutdown token:
        // a cancellation in progress cannot drop the append.
        if let Err(error) = journal::append_instruction(&*self.journal, &order).await {
            (self.on_error)(&def.order_id, error);
        }
    }

    async fn spawn_order(&mut self, token: &CancellationToken, order: T, def: Order) {
        let handler = Handler::new(&order, &*self.factory, self.journal.clone());
        self.by_order_id.insert(
            def.order_id.clone(),
            Process {
                definition: def.clone(),
                queue: handler.queue(),
            },
        );
        self.handlers
            .spawn(handler.run(token.child_token(), self.completed_tx.clone()));
        debug!(order_id = %def.order_id, symbol = %def.symbol, "order registered");

        let first_holder = match self.by_symbol.entry(def.symbol.clone()) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().push(def.order_id.clone());
                false
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(vec![def.order_id.clone()]);
                true
            }
        };
        if first_holder {
            self.subscriber.subscribe(def.symbol.clone()).await;
        }
    }

    async fn remove_order(&mut self, order_id: &str) {
        let Some(process) = self.by_order_id.remove(order_id) else {
            return;
        };
        let symbol = process.definition.symbol;

        let last_holder = match self.by_symbol.get_mut(&symbol) {
            Some(orders) => {
                orders.retain(|id| id != order_id);
                orders.is_empty()
            }
            None => true,
        };
        if last_holder {
            self.by_symbol.remove(&symbol);
            self.subscriber.unsubscribe(symbol).await;
        }
    }

    async fn handle_report(&mut self, report: Report) {
        if !self.by_order_id.contains_key(&report.order_id) {
            (self.on_error)(
                &report.order_id,
                Error::UnexpectedReport(report.order_id.clone()),
            );
            return;
        }
        if let Err(error) = journal::append_report(&*self.journal, &report).await {
            (self.on_error)(&report.order_id, error);
        }
    }

    fn fan_out(&self, symbol: &Symbol, ticker: Ticker) {
        let Some(orders) = self.by_symbol.get(symbol) else {
            return;
        };
        for order_id in orders {
            if let Some(process) = self.by_order_id.get(order_id) {
                process.queue.push(ticker.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{new_order_id, OrdStatus, Side, TimeInForce};
    use crate::runtime::journal::MemoryJournal;
    use crate::runtime::{Delegate, Ticker};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[derive(Default)]
    struct MockSubscriber {
        subscribes: Mutex<Vec<Symbol>>,
        unsubscribes: Mutex<Vec<Symbol>>,
    }

    #[async_trait]
    impl Subscribable for MockSubscriber {
        async fn subscribe(&self, symbol: Symbol) {
            self.subscribes.lock().push(symbol);
        }
        async fn unsubscribe(&self, symbol: Symbol) {
            self.unsubscribes.lock().push(symbol);
        }
    }

    struct QuietDelegate;

    impl Delegate<Order> for QuietDelegate {
        fn action(&mut self, _: Option<Ticker>, _: Vec<Order>, _: Vec<Report>) -> bool {
            false
        }
        fn clean_up(&mut self) {}
    }

    struct QuietFactory;

    impl DelegateFactory<Order> for QuietFactory {
        fn new_delegate(&self, _: &Order) -> Box<dyn Delegate<Order>> {
            Box::new(QuietDelegate)
        }
    }

    struct Fixture {
        instructions: mpsc::Sender<Order>,
        reporter: Reporter,
        subscriber: Arc<MockSubscriber>,
        journal: Arc<MemoryJournal>,
        errors: Arc<Mutex<Vec<(String, Error)>>>,
        quotes: Arc<ConflatingQueue<Symbol, Quote>>,
        token: CancellationToken,
        run: tokio::task::JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let (instructions_tx, instructions_rx) = mpsc::channel(8);
        let (reporter, reports_rx) = Reporter::channel();
        let subscriber = Arc::new(MockSubscriber::default());
        let journal = Arc::new(MemoryJournal::new());
        let errors: Arc<Mutex<Vec<(String, Error)>>> = Arc::new(Mutex::new(Vec::new()));
        let quotes = crate::runtime::ticker::quote_queue();
        let trades = crate::runtime::ticker::trade_queue();
        let token = CancellationToken::new();

        let sink = errors.clone();
        let dispatcher = Dispatcher::new(
            instructions_rx,
            Arc::new(QuietFactory),
            reports_rx,
            reporter.clone(),
            subscriber.clone(),
            quotes.clone(),
            trades,
            Box::new(move |order_id, error| sink.lock().push((order_id.to_string(), error))),
            journal.clone(),
        );
        let run = tokio::spawn(dispatcher.run(token.clone()));

        Fixture {
            instructions: instructions_tx,
            reporter,
            subscriber,
            journal,
            errors,
            quotes,
            token,
            run,
        }
    }

    fn order(order_id: &str, msg_type: MsgType, symbol: &str) -> Order {
        Order {
            msg_type,
            order_id: order_id.to_string(),
            side: Side::Buy,
            symbol: Symbol::new(symbol),
            order_qty: Some(dec!(100)),
            price: Some(dec!(42)),
            time_in_force: TimeInForce::Gtc,
        }
    }

    async fn settle<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn subscriptions_are_reference_counted_by_symbol() {
        let f = fixture();
        let (o1, o2, o3) = (new_order_id(), new_order_id(), new_order_id());

        // New orders on X and Y: one subscribe each.
        f.instructions.send(order(&o1, MsgType::New, "X")).await.unwrap();
        f.instructions.send(order(&o2, MsgType::New, "Y")).await.unwrap();
        settle(|| f.subscriber.subscribes.lock().len() == 2).await;

        // A second order on X: no further subscribe.
        f.instructions.send(order(&o3, MsgType::New, "X")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.subscriber.subscribes.lock().len(), 2);

        // Cancelling one X order does not release the symbol.
        f.instructions.send(order(&o1, MsgType::Cancel, "X")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.subscriber.unsubscribes.lock().is_empty());

        // Cancelling the second does.
        f.instructions.send(order(&o3, MsgType::Cancel, "X")).await.unwrap();
        settle(|| f.subscriber.unsubscribes.lock().len() == 1).await;
        assert_eq!(f.subscriber.unsubscribes.lock()[0], Symbol::new("X"));

        f.token.cancel();
        f.run.await.unwrap();
    }

    #[tokio::test]
    async fn instructions_for_unknown_orders_must_be_new() {
        let f = fixture();
        let o1 = new_order_id();
        f.instructions
            .send(order(&o1, MsgType::Cancel, "X"))
            .await
            .unwrap();
        settle(|| !f.errors.lock().is_empty()).await;
        assert!(matches!(f.errors.lock()[0].1, Error::ExpectedNew(_)));
        assert!(f.subscriber.subscribes.lock().is_empty());
        f.token.cancel();
        f.run.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_new_and_mismatched_definitions_are_errors() {
        let f = fixture();
        let o1 = new_order_id();
        f.instructions.send(order(&o1, MsgType::New, "X")).await.unwrap();
        f.instructions.send(order(&o1, MsgType::New, "X")).await.unwrap();
        settle(|| !f.errors.lock().is_empty()).await;
        assert!(matches!(f.errors.lock()[0].1, Error::DuplicateNew(_)));

        // Replace on the wrong symbol.
        f.instructions
            .send(order(&o1, MsgType::Replace, "Y"))
            .await
            .unwrap();
        settle(|| f.errors.lock().len() == 2).await;
        assert!(matches!(
            f.errors.lock()[1].1,
            Error::DefinitionMismatch(_)
        ));
        // Neither faulty instruction reached the stream.
        assert!(f
            .journal
            .stream(&journal::instructions_stream(&o1))
            .is_empty());

        f.token.cancel();
        f.run.await.unwrap();
    }

    #[tokio::test]
    async fn follow_up_instructions_are_journaled() {
        let f = fixture();
        let o1 = new_order_id();
        f.instructions.send(order(&o1, MsgType::New, "X")).await.unwrap();
        f.instructions
            .send(order(&o1, MsgType::Replace, "X"))
            .await
            .unwrap();
        settle(|| f.journal.stream(&journal::instructions_stream(&o1)).len() == 1).await;

        // A cancel is journaled too, even though the mapping goes away.
        f.instructions
            .send(order(&o1, MsgType::Cancel, "X"))
            .await
            .unwrap();
        settle(|| f.journal.stream(&journal::instructions_stream(&o1)).len() == 2).await;
        settle(|| f.subscriber.unsubscribes.lock().len() == 1).await;

        f.token.cancel();
        f.run.await.unwrap();
    }

    #[tokio::test]
    async fn reports_are_journaled_for_known_orders_only() {
        let f = fixture();
        let o1 = new_order_id();
        f.instructions.send(order(&o1, MsgType::New, "X")).await.unwrap();
        settle(|| f.subscriber.subscribes.lock().len() == 1).await;

        let report = Report {
            order_id: o1.clone(),
            secondary_order_id: "S1".into(),
            cl_ord_id: new_order_id(),
            symbol: Symbol::new("X"),
            side: Side::Buy,
            ord_status: OrdStatus::New,
            last_qty: None,
            last_px: None,
            transact_time: chrono::Utc::now(),
            time_in_force: TimeInForce::Gtc,
            exec_inst: String::new(),
        };
        f.reporter.on_report(report.clone()).await;
        settle(|| f.journal.stream(&journal::reports_stream(&o1)).len() == 1).await;

        let mut unknown = report;
        unknown.order_id = new_order_id();
        f.reporter.on_report(unknown.clone()).await;
        settle(|| !f.errors.lock().is_empty()).await;
        assert!(matches!(f.errors.lock()[0].1, Error::UnexpectedReport(_)));
        assert!(f
            .journal
            .stream(&journal::reports_stream(&unknown.order_id))
            .is_empty());

        f.token.cancel();
        f.run.await.unwrap();
    }

    #[tokio::test]
    async fn market_data_fans_out_by_symbol() {
        let f = fixture();
        let o1 = new_order_id();
        f.instructions.send(order(&o1, MsgType::New, "X")).await.unwrap();
        settle(|| f.subscriber.subscribes.lock().len() == 1).await;

        f.quotes.push(Quote {
            symbol: Symbol::new("X"),
            bid_px: dec!(42),
            bid_size: dec!(100),
            ask_px: dec!(43),
            ask_size: dec!(150),
        });
        // The quote lands in the handler's queue and is consumed by
        // its delegate; observable here as the queue draining.
        settle(|| f.quotes.is_empty()).await;

        f.token.cancel();
        f.run.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_joins_every_handler() {
        let f = fixture();
        for _ in 0..4 {
            f.instructions
                .send(order(&new_order_id(), MsgType::New, "X"))
                .await
                .unwrap();
        }
        settle(|| f.subscriber.subscribes.lock().len() == 1).await;

        f.token.cancel();
        // run returns only after every handler has exited.
        tokio::time::timeout(Duration::from_secs(5), f.run)
            .await
            .expect("dispatcher joined handlers")
            .unwrap();
    }
}

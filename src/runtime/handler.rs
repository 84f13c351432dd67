//! The per-order process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::conflate::ConflatingQueue;
use crate::core::config::{HANDLER_WAKE, STREAM_READ_BLOCK};
use crate::core::{Order, Report};
use crate::runtime::journal::{
    self, instructions_stream, order_hash, reports_stream, Journal, ReadFrom, START_ID,
};
use crate::runtime::{AnyOrder, Delegate, DelegateFactory, Ticker};

/// A handler runs for the lifetime of one order, feeding ticker data,
/// instructions and reports to its [`Delegate`] and checkpointing the
/// stream positions it has consumed.
pub struct Handler<T: AnyOrder> {
    definition: Order,
    queue: Arc<ConflatingQueue<(), Ticker>>,
    delegate: Box<dyn Delegate<T>>,
    journal: Arc<dyn Journal>,
    instructions_stream: String,
    last_instruction_id: String,
    reports_stream: String,
    last_report_id: String,
    order_hash: String,
    wake: Duration,
    read_block: Duration,
}

impl<T: AnyOrder> Handler<T> {
    pub fn new(
        order: &T,
        factory: &dyn DelegateFactory<T>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        let definition = order.definition().clone();
        Self {
            queue: crate::runtime::ticker::ticker_queue(),
            delegate: factory.new_delegate(order),
            journal,
            instructions_stream: instructions_stream(&definition.order_id),
            last_instruction_id: START_ID.to_string(),
            reports_stream: reports_stream(&definition.order_id),
            last_report_id: START_ID.to_string(),
            order_hash: order_hash(&definition.order_id),
            wake: HANDLER_WAKE,
            read_block: STREAM_READ_BLOCK,
            definition,
        }
    }

    /// The immutable routing definition, for the dispatcher.
    pub fn definition(&self) -> &Order {
        &self.definition
    }

    /// The ticker queue the dispatcher pushes market data into.
    pub fn queue(&self) -> Arc<ConflatingQueue<(), Ticker>> {
        self.queue.clone()
    }

    /// Run until cancelled or the delegate declares the order complete.
    /// Completion is announced on `completed`; cancellation is not.
    pub async fn run(mut self, token: CancellationToken, completed: mpsc::Sender<String>) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    self.delegate.clean_up();
                    debug!(order_id = %self.definition.order_id, "handler cancelled");
                    return;
                }
                _ = self.queue.ready() => {
                    while let Some(ticker) = self.queue.pop() {
                        if self.step(Some(ticker), &completed).await {
                            return;
                        }
                    }
                }
                // When the listing trades slowly, still look for
                // instructions and reports at a bounded interval.
                _ = tokio::time::sleep(self.wake) => {
                    if self.step(None, &completed).await {
                        return;
                    }
                }
            }
        }
    }

    async fn step(&mut self, ticker: Option<Ticker>, completed: &mpsc::Sender<String>) -> bool {
        let (instructions, reports) = match self.consume_streams().await {
            Ok(read) => read,
            Err(error) => {
                warn!(order_id = %self.definition.order_id, %error, "stream read failed");
                return false;
            }
        };
        let done = self.delegate.action(ticker, instructions, reports);
        self.checkpoint().await;
        if done {
            let _ = completed.send(self.definition.order_id.clone()).await;
        }
        done
    }

    async fn consume_streams(&mut self) -> crate::core::Result<(Vec<T>, Vec<Report>)> {
        let positions = [
            ReadFrom {
                stream: self.instructions_stream.clone(),
                after_id: self.last_instruction_id.clone(),
            },
            ReadFrom {
                stream: self.reports_stream.clone(),
                after_id: self.last_report_id.clone(),
            },
        ];
        let batches = self.journal.read_from(&positions, self.read_block).await?;

        let mut instructions = Vec::new();
        let mut reports = Vec::new();
        for batch in batches {
            if batch.stream == self.instructions_stream {
                for entry in &batch.entries {
                    instructions.push(journal::decode_instruction(entry)?);
                    self.last_instruction_id = entry.id.clone();
                }
            } else if batch.stream == self.reports_stream {
                for entry in &batch.entries {
                    reports.push(journal::decode_report(entry)?);
                    self.last_report_id = entry.id.clone();
                }
            }
        }
        Ok((instructions, reports))
    }

    /// Record the consumed stream positions. Failures are swallowed;
    /// the next iteration writes the same or later positions again.
    async fn checkpoint(&self) {
        let fields = [
            (
                self.instructions_stream.clone(),
                self.last_instruction_id.clone(),
            ),
            (self.reports_stream.clone(), self.last_report_id.clone()),
        ];
        if let Err(error) = self.journal.write_hash(&self.order_hash, &fields).await {
            debug!(order_id = %self.definition.order_id, %error, "checkpoint failed");
        }
    }
}

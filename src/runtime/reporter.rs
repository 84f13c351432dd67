//! Acknowledged report channel into the dispatcher.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use crate::core::Report;

/// Feeds execution reports to the dispatcher one at a time.
///
/// `on_report` suspends until the previous report has been
/// acknowledged, so a slow dispatcher exerts backpressure on the
/// counterparty adapter instead of losing reports. The dispatcher
/// calls `acknowledge` once the report is durably appended.
#[derive(Clone)]
pub struct Reporter {
    tx: mpsc::Sender<Report>,
    gate: Arc<Semaphore>,
}

impl Reporter {
    /// A reporter and the receiving end for the dispatcher.
    pub fn channel() -> (Self, mpsc::Receiver<Report>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                tx,
                gate: Arc::new(Semaphore::new(1)),
            },
            rx,
        )
    }

    /// Send a report, waiting for the previous one to be acknowledged.
    pub async fn on_report(&self, report: Report) {
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return,
        }
        if self.tx.send(report).await.is_err() {
            // Receiver gone (shutdown). Release the gate so later
            // callers do not hang.
            self.gate.add_permits(1);
        }
    }

    /// Signal that the last received report has been processed.
    pub fn acknowledge(&self) {
        self.gate.add_permits(1);
    }
}

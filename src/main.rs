//! Example runtime: orders arrive over HTTP, market data from the
//! Coinbase ticker channel, and a paper-trading delegate crosses the
//! far touch until each order is done.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use exflow::core::config::{self, CONNECTION_LIFETIME};
use exflow::core::{Config, MsgType, Order, Report};
use exflow::feeds::coinbase::CoinbaseCodec;
use exflow::feeds::{FeedEvents, Subscriber};
use exflow::rate::RateLimiter;
use exflow::runtime::{
    quote_queue, trade_queue, Delegate, DelegateFactory, Dispatcher, Journal, MemoryJournal,
    Reporter, Ticker,
};

/// Hash carrying a memo per paper order.
const PAPER_MEMO_HASH: &str = "hash:paper-orders";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Memo {
    order: Order,
    cum_qty: Decimal,
}

/// Trades on paper: cross whatever size the far touch shows until the
/// order quantity is done.
struct PaperDelegate {
    definition: Order,
    cum_qty: Decimal,
    journal: Arc<dyn Journal>,
}

impl PaperDelegate {
    fn persist(&self) {
        let memo = Memo {
            order: self.definition.clone(),
            cum_qty: self.cum_qty,
        };
        let Ok(json) = serde_json::to_string(&memo) else {
            return;
        };
        let journal = self.journal.clone();
        let order_id = self.definition.order_id.clone();
        tokio::spawn(async move {
            let _ = journal
                .write_hash(PAPER_MEMO_HASH, &[(order_id, json)])
                .await;
        });
    }
}

impl Delegate<Order> for PaperDelegate {
    fn action(
        &mut self,
        ticker: Option<Ticker>,
        instructions: Vec<Order>,
        reports: Vec<Report>,
    ) -> bool {
        for instruction in &instructions {
            match instruction.msg_type {
                MsgType::Cancel => {
                    info!(order_id = %self.definition.order_id, "cancelled");
                    return true;
                }
                MsgType::Replace => {
                    if let Some(order_qty) = instruction.order_qty {
                        self.definition.order_qty = Some(order_qty);
                    }
                    if instruction.price.is_some() {
                        self.definition.price = instruction.price;
                    }
                    self.persist();
                }
                MsgType::New => {}
            }
        }

        for report in &reports {
            info!(
                order_id = %report.order_id,
                status = ?report.ord_status,
                actionable = report.actionable(),
                "report"
            );
        }

        let Some(quote) = ticker.and_then(|t| t.quote) else {
            return false;
        };
        let order_qty = self.definition.order_qty.unwrap_or_default();
        let leaves_qty = order_qty - self.cum_qty;
        let (px, size) = quote.far(self.definition.side);
        let fill = size.min(leaves_qty);
        if fill <= Decimal::ZERO {
            return false;
        }
        info!(
            order_id = %self.definition.order_id,
            symbol = %self.definition.symbol,
            %fill,
            %px,
            "paper trade"
        );
        self.cum_qty += fill;
        self.persist();
        if self.cum_qty >= order_qty {
            info!(order_id = %self.definition.order_id, "done");
            return true;
        }
        false
    }

    fn clean_up(&mut self) {}
}

struct PaperFactory {
    journal: Arc<dyn Journal>,
}

impl DelegateFactory<Order> for PaperFactory {
    fn new_delegate(&self, order: &Order) -> Box<dyn Delegate<Order>> {
        let delegate = PaperDelegate {
            definition: order.clone(),
            cum_qty: Decimal::ZERO,
            journal: self.journal.clone(),
        };
        delegate.persist();
        Box::new(delegate)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    if let Some(path) = std::env::args().nth(1) {
        config::load_env_file(&path)?;
    }
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    let root = CancellationToken::new();
    let journal: Arc<MemoryJournal> = Arc::new(MemoryJournal::new());

    // Market data.
    let quotes = quote_queue();
    let trades = trade_queue();
    let events = FeedEvents::into_queues(quotes.clone(), trades.clone(), |error| {
        error!(%error, "market data")
    });
    let subscriber = Arc::new(Subscriber::new(
        config.ws_url.clone(),
        Arc::new(CoinbaseCodec::new()),
        events,
        Arc::new(RateLimiter::new(config.rate, Duration::from_secs(1))),
        CONNECTION_LIFETIME,
        root.child_token(),
    ));

    // Dispatch.
    let (instructions_tx, instructions_rx) = mpsc::channel(1);
    let (reporter, reports_rx) = Reporter::channel();
    let dispatcher = Dispatcher::new(
        instructions_rx,
        Arc::new(PaperFactory {
            journal: journal.clone(),
        }),
        reports_rx,
        reporter,
        subscriber,
        quotes,
        trades,
        Box::new(|order_id, error| error!(order_id, %error, "dispatch")),
        journal,
    );
    let dispatcher_task = tokio::spawn(dispatcher.run(root.child_token()));

    // Ingress.
    let router = exflow::http::router(instructions_tx, config.symbol.clone());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(address = %config.http_addr, symbol = %config.symbol, "listening");
    let http_token = root.child_token();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(async move { http_token.cancelled().await })
            .await;
    });

    tokio::signal::ctrl_c().await?;
    info!("terminating");
    root.cancel();
    dispatcher_task.await?;
    info!("done");
    Ok(())
}

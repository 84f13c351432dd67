//! Market-data subscriptions.
//!
//! A [`connection::Connection`] owns one websocket to one venue for
//! one symbol; the [`Subscriber`] de-duplicates symbols across callers
//! and is what the dispatcher reference-counts against.

pub mod binance;
pub mod bitmex;
pub mod coinbase;
pub mod connection;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::conflate::ConflatingQueue;
use crate::core::{Error, Quote, Symbol, Trade};
use crate::rate::RateLimiter;
use connection::{Connection, VenueCodec};

/// What the dispatcher needs from a subscription layer.
#[async_trait]
pub trait Subscribable: Send + Sync {
    async fn subscribe(&self, symbol: Symbol);
    async fn unsubscribe(&self, symbol: Symbol);
}

/// Callbacks a connection emits into.
#[derive(Clone)]
pub struct FeedEvents {
    pub on_quote: Arc<dyn Fn(Quote) + Send + Sync>,
    pub on_trade: Arc<dyn Fn(Trade) + Send + Sync>,
    pub on_error: Arc<dyn Fn(Error) + Send + Sync>,
}

impl FeedEvents {
    /// Events wired into the dispatcher's global conflating queues.
    pub fn into_queues(
        quotes: Arc<ConflatingQueue<Symbol, Quote>>,
        trades: Arc<ConflatingQueue<Symbol, Trade>>,
        on_error: impl Fn(Error) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_quote: Arc::new(move |quote| quotes.push(quote)),
            on_trade: Arc::new(move |trade| trades.push(trade)),
            on_error: Arc::new(on_error),
        }
    }
}

struct Live {
    token: CancellationToken,
    reader: JoinHandle<()>,
}

/// One venue's subscriptions: at most one [`Connection`] per symbol,
/// serialized by a mutex. Subscribe and unsubscribe are idempotent and
/// ignore the empty symbol.
pub struct Subscriber {
    url: String,
    codec: Arc<dyn VenueCodec>,
    events: FeedEvents,
    limiter: Arc<RateLimiter>,
    lifetime: Duration,
    token: CancellationToken,
    subscriptions: Mutex<HashMap<Symbol, Live>>,
}

impl Subscriber {
    pub fn new(
        url: impl Into<String>,
        codec: Arc<dyn VenueCodec>,
        events: FeedEvents,
        limiter: Arc<RateLimiter>,
        lifetime: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            url: url.into(),
            codec,
            events,
            limiter,
            lifetime,
            token,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Subscribable for Subscriber {
    async fn subscribe(&self, symbol: Symbol) {
        if symbol.is_empty() {
            return;
        }
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.contains_key(&symbol) {
            return;
        }
        info!(%symbol, "subscribing");
        let token = self.token.child_token();
        let connection = Connection::new(
            self.url.clone(),
            symbol.clone(),
            self.codec.clone(),
            self.events.clone(),
            self.limiter.clone(),
            self.lifetime,
            token.clone(),
        );
        let reader = tokio::spawn(connection.run());
        subscriptions.insert(symbol, Live { token, reader });
    }

    async fn unsubscribe(&self, symbol: Symbol) {
        if symbol.is_empty() {
            return;
        }
        let Some(live) = self.subscriptions.lock().remove(&symbol) else {
            return;
        };
        info!(%symbol, "unsubscribing");
        self.limiter.block().await;
        live.token.cancel();
        let _ = live.reader.await;
    }
}

//! One websocket to one venue for one symbol.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::core::{Error, Quote, Result, Symbol, Trade};
use crate::feeds::FeedEvents;
use crate::rate::RateLimiter;

/// What a venue frame yields: at most one quote, any number of trades.
/// A trade id, where the venue supplies one, is monotonic within a
/// websocket session and drives duplicate suppression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFrame {
    pub quote: Option<Quote>,
    pub trades: Vec<(Trade, Option<i64>)>,
}

/// Venue-specific framing: subscription messages and the parser.
pub trait VenueCodec: Send + Sync {
    fn subscribe_frame(&self, symbol: &Symbol) -> Result<String>;
    fn unsubscribe_frame(&self, symbol: &Symbol) -> Result<String>;
    fn parse(&self, frame: &str) -> Result<ParsedFrame>;
}

enum SessionEnd {
    /// Lifetime expired: tear down and dial again.
    Reconnect,
    /// Cancelled or failed: the reader exits for good.
    Closed,
}

/// A market-data connection. `run` owns the socket for the life of the
/// task: it dials through the rate limiter, subscribes, routes inbound
/// frames to the codec, and reconnects when the lifetime watchdog
/// fires. Any error reports through `on_error` and ends the task.
pub struct Connection {
    url: String,
    symbol: Symbol,
    codec: Arc<dyn VenueCodec>,
    events: FeedEvents,
    limiter: Arc<RateLimiter>,
    lifetime: Duration,
    token: CancellationToken,
}

impl Connection {
    pub fn new(
        url: String,
        symbol: Symbol,
        codec: Arc<dyn VenueCodec>,
        events: FeedEvents,
        limiter: Arc<RateLimiter>,
        lifetime: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            url,
            symbol,
            codec,
            events,
            limiter,
            lifetime,
            token,
        }
    }

    pub async fn run(self) {
        if Url::parse(&self.url).is_err() {
            (self.events.on_error)(Error::WebSocket(format!("bad url: {}", self.url)));
            return;
        }
        loop {
            // Every open, first or watchdog-driven, takes a permit.
            self.limiter.block().await;
            if self.token.is_cancelled() {
                return;
            }
            match self.session().await {
                SessionEnd::Reconnect => {
                    debug!(symbol = %self.symbol, "connection lifetime expired, reconnecting");
                }
                SessionEnd::Closed => return,
            }
        }
    }

    async fn session(&self) -> SessionEnd {
        let (stream, _) = match connect_async(self.url.as_str()).await {
            Ok(connected) => connected,
            Err(error) => {
                (self.events.on_error)(Error::WebSocket(error.to_string()));
                return SessionEnd::Closed;
            }
        };
        let (mut write, mut read) = stream.split();

        let subscribe = match self.codec.subscribe_frame(&self.symbol) {
            Ok(frame) => frame,
            Err(error) => {
                (self.events.on_error)(error);
                return SessionEnd::Closed;
            }
        };
        if let Err(error) = write.send(Message::Text(subscribe)).await {
            (self.events.on_error)(Error::WebSocket(error.to_string()));
            return SessionEnd::Closed;
        }

        // Trade-id monotonicity holds only within one session; a fresh
        // session admits the first trade whatever its id.
        let mut last_trade_id: Option<i64> = None;

        let lifetime = tokio::time::sleep(self.lifetime);
        tokio::pin!(lifetime);

        let end = loop {
            tokio::select! {
                _ = self.token.cancelled() => break SessionEnd::Closed,
                _ = &mut lifetime => break SessionEnd::Reconnect,
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if self.route(&text, &mut last_trade_id).is_err() {
                            break SessionEnd::Closed;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        (self.events.on_error)(Error::WebSocket("closed by venue".into()));
                        break SessionEnd::Closed;
                    }
                    Some(Err(error)) => {
                        (self.events.on_error)(Error::WebSocket(error.to_string()));
                        break SessionEnd::Closed;
                    }
                    Some(Ok(_)) => {}
                }
            }
        };

        // Best-effort teardown either way.
        if let Ok(frame) = self.codec.unsubscribe_frame(&self.symbol) {
            let _ = write.send(Message::Text(frame)).await;
        }
        let _ = write.close().await;
        end
    }

    fn route(&self, text: &str, last_trade_id: &mut Option<i64>) -> std::result::Result<(), ()> {
        let parsed = match self.codec.parse(text) {
            Ok(parsed) => parsed,
            Err(error) => {
                (self.events.on_error)(error);
                return Err(());
            }
        };
        if let Some(quote) = parsed.quote {
            (self.events.on_quote)(quote);
        }
        for (trade, trade_id) in parsed.trades {
            if let Some(id) = trade_id {
                if *last_trade_id == Some(id) {
                    continue;
                }
                *last_trade_id = Some(id);
            }
            (self.events.on_trade)(trade);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{quote_queue, trade_queue};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    struct StubCodec;

    impl VenueCodec for StubCodec {
        fn subscribe_frame(&self, symbol: &Symbol) -> Result<String> {
            Ok(format!("sub:{symbol}"))
        }
        fn unsubscribe_frame(&self, symbol: &Symbol) -> Result<String> {
            Ok(format!("unsub:{symbol}"))
        }
        fn parse(&self, frame: &str) -> Result<ParsedFrame> {
            // "q" or "t:<id>" or "t:-" frames.
            if frame == "q" {
                return Ok(ParsedFrame {
                    quote: Some(Quote {
                        symbol: Symbol::new("A"),
                        bid_px: dec!(42),
                        bid_size: dec!(1),
                        ask_px: dec!(43),
                        ask_size: dec!(1),
                    }),
                    trades: Vec::new(),
                });
            }
            if let Some(id) = frame.strip_prefix("t:") {
                let trade = Trade::new(Symbol::new("A"), dec!(1), dec!(42));
                let id = id.parse::<i64>().ok();
                return Ok(ParsedFrame {
                    quote: None,
                    trades: vec![(trade, id)],
                });
            }
            Err(Error::Parse(frame.to_string()))
        }
    }

    fn connection_for_routing(
        quotes: Arc<crate::conflate::ConflatingQueue<Symbol, Quote>>,
        trades: Arc<crate::conflate::ConflatingQueue<Symbol, Trade>>,
        errors: Arc<Mutex<Vec<Error>>>,
    ) -> Connection {
        let sink = errors.clone();
        Connection::new(
            "ws://localhost:0".into(),
            Symbol::new("A"),
            Arc::new(StubCodec),
            FeedEvents::into_queues(quotes, trades, move |e| sink.lock().push(e)),
            Arc::new(RateLimiter::new(5, Duration::from_secs(1))),
            Duration::from_secs(3600),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn duplicate_trade_ids_are_dropped_within_a_session() {
        let quotes = quote_queue();
        let trades = trade_queue();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let connection = connection_for_routing(quotes.clone(), trades.clone(), errors);

        let mut last = None;
        connection.route("t:7", &mut last).unwrap();
        connection.route("t:7", &mut last).unwrap();
        connection.route("t:8", &mut last).unwrap();
        // Trades without an id are always admitted.
        connection.route("t:-", &mut last).unwrap();

        let aggregate = trades.pop().unwrap();
        assert_eq!(aggregate.trade_volume, dec!(3));
    }

    #[tokio::test]
    async fn parse_failures_report_and_end_the_reader() {
        let quotes = quote_queue();
        let trades = trade_queue();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let connection = connection_for_routing(quotes.clone(), trades, errors.clone());

        let mut last = None;
        connection.route("q", &mut last).unwrap();
        assert!(connection.route("garbage", &mut last).is_err());
        assert_eq!(errors.lock().len(), 1);
        assert!(quotes.pop().is_some());
    }
}

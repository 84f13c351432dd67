//! Conflated market-data views and the queues that carry them.

use std::sync::Arc;

use crate::conflate::ConflatingQueue;
use crate::core::config::DEFAULT_DECIMAL_PLACES;
use crate::core::{Quote, Symbol, Trade};

/// The combined quote and trade update a handler sees. Either part may
/// be absent; under conflation the quote is the latest observed and
/// the trade the aggregate since the last pop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ticker {
    pub quote: Option<Quote>,
    pub trade: Option<Trade>,
}

impl Ticker {
    pub fn from_quote(quote: Quote) -> Self {
        Self {
            quote: Some(quote),
            trade: None,
        }
    }

    pub fn from_trade(trade: Trade) -> Self {
        Self {
            quote: None,
            trade: Some(trade),
        }
    }
}

/// Merge `latest` into `existing`: latest-wins on the quote,
/// size-weighted accumulation on the trade.
pub fn conflate_ticker(existing: &mut Ticker, latest: Ticker) {
    if let Some(quote) = latest.quote {
        existing.quote = Some(quote);
    }
    if let Some(trade) = latest.trade {
        existing.trade = Some(match existing.trade.take() {
            Some(mut aggregate) => {
                aggregate.aggregate(&trade, DEFAULT_DECIMAL_PLACES);
                aggregate
            }
            None => trade,
        });
    }
}

/// The single-slot ticker queue owned by each handler.
pub fn ticker_queue() -> Arc<ConflatingQueue<(), Ticker>> {
    Arc::new(ConflatingQueue::with_conflate(|_| (), conflate_ticker))
}

/// The global quote queue: one slot per symbol, latest quote wins.
pub fn quote_queue() -> Arc<ConflatingQueue<Symbol, Quote>> {
    Arc::new(ConflatingQueue::new(|quote: &Quote| quote.symbol.clone()))
}

/// The global trade queue: one slot per symbol, trades accumulate.
pub fn trade_queue() -> Arc<ConflatingQueue<Symbol, Trade>> {
    Arc::new(ConflatingQueue::with_conflate(
        |trade: &Trade| trade.symbol.clone(),
        |existing, latest| existing.aggregate(&latest, DEFAULT_DECIMAL_PLACES),
    ))
}

/// Everything an order process can be fed in one update, for delegates
/// that want instructions and reports conflated alongside market data
/// instead of tailing the streams per step.
#[derive(Debug, Clone)]
pub struct Composite<T> {
    pub instructions: Vec<T>,
    pub reports: Vec<crate::core::Report>,
    pub quote: Option<Quote>,
    pub trade: Option<Trade>,
}

impl<T> Default for Composite<T> {
    fn default() -> Self {
        Self {
            instructions: Vec::new(),
            reports: Vec::new(),
            quote: None,
            trade: None,
        }
    }
}

/// Merge `latest` into `existing`: instructions and reports append,
/// the quote is latest-wins and the trade accumulates.
pub fn conflate_composite<T>(existing: &mut Composite<T>, latest: Composite<T>) {
    existing.instructions.extend(latest.instructions);
    existing.reports.extend(latest.reports);
    if let Some(quote) = latest.quote {
        existing.quote = Some(quote);
    }
    if let Some(trade) = latest.trade {
        existing.trade = Some(match existing.trade.take() {
            Some(mut aggregate) => {
                aggregate.aggregate(&trade, DEFAULT_DECIMAL_PLACES);
                aggregate
            }
            None => trade,
        });
    }
}

/// A single-slot composite queue for one order process.
pub fn composite_queue<T: Send + 'static>() -> Arc<ConflatingQueue<(), Composite<T>>> {
    Arc::new(ConflatingQueue::with_conflate(|_| (), conflate_composite))
}

//! The dispatch-and-per-order-process runtime.

pub mod delegate;
pub mod dispatcher;
pub mod handler;
pub mod journal;
pub mod reporter;
pub mod ticker;

pub use delegate::{AnyOrder, Delegate, DelegateFactory};
pub use dispatcher::Dispatcher;
pub use handler::Handler;
pub use journal::{Journal, MemoryJournal};
pub use reporter::Reporter;
pub use ticker::{
    composite_queue, conflate_composite, conflate_ticker, quote_queue, ticker_queue, trade_queue,
    Composite, Ticker,
};

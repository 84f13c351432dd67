//! The user-pluggable decision seam.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::{Order, Report};
use crate::runtime::Ticker;

/// Any order type the dispatcher can route. Concrete types carry
/// delegate-private fields and expose the routing definition through
/// the one required method.
pub trait AnyOrder: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn definition(&self) -> &Order;
}

impl AnyOrder for Order {
    fn definition(&self) -> &Order {
        self
    }
}

/// All the logic for reacting to market data and execution reports on
/// one order. Calls are strictly serialized by the owning handler.
pub trait Delegate<T: AnyOrder>: Send + Sync {
    /// React to a conflated ticker (absent on a periodic wake) plus
    /// any new instructions and reports from the durable streams.
    /// Return true when the order is complete and the handler should
    /// shut down.
    fn action(&mut self, ticker: Option<Ticker>, instructions: Vec<T>, reports: Vec<Report>)
        -> bool;

    /// The dispatcher is exiting. The order is not cancelled; there
    /// will simply be no further `action` calls.
    fn clean_up(&mut self);
}

/// Manufactures a [`Delegate`] for each arriving New instruction.
pub trait DelegateFactory<T: AnyOrder>: Send + Sync {
    fn new_delegate(&self, order: &T) -> Box<dyn Delegate<T>>;
}

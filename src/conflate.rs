//! Keyed conflating queue.
//!
//! The queue holds at most one value per key. A push for a key already
//! present merges the latest value into the stored one instead of
//! growing the queue, so a slow consumer sees a bounded backlog whose
//! entries are each the merged history of their key. Pop order is FIFO
//! over the first insertion of each surviving key, not the last update.
//!
//! Readiness is edge-triggered: the signal fires when a push takes the
//! queue from empty to non-empty, and the consumer must drain until
//! `pop` returns `None` after each wake.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::Notify;

type KeyFn<K, V> = Box<dyn Fn(&V) -> K + Send + Sync>;
type ConflateFn<V> = Box<dyn Fn(&mut V, V) + Send + Sync>;

pub struct ConflatingQueue<K, V> {
    inner: Mutex<Inner<K, V>>,
    ready: Notify,
    key: KeyFn<K, V>,
    conflate: ConflateFn<V>,
}

struct Inner<K, V> {
    order: VecDeque<K>,
    values: HashMap<K, V>,
}

impl<K, V> ConflatingQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    /// A queue whose repeated keys keep only the latest value.
    pub fn new(key: impl Fn(&V) -> K + Send + Sync + 'static) -> Self {
        Self::with_conflate(key, |existing, latest| *existing = latest)
    }

    /// A queue with a custom merge for repeated keys.
    pub fn with_conflate(
        key: impl Fn(&V) -> K + Send + Sync + 'static,
        conflate: impl Fn(&mut V, V) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                values: HashMap::new(),
            }),
            ready: Notify::new(),
            key: Box::new(key),
            conflate: Box::new(conflate),
        }
    }

    /// Push a value, merging it into any stored value with the same
    /// key. Never blocks.
    pub fn push(&self, value: V) {
        let k = (self.key)(&value);
        let was_empty;
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            was_empty = inner.order.is_empty();
            match inner.values.entry(k) {
                Entry::Occupied(mut occupied) => (self.conflate)(occupied.get_mut(), value),
                Entry::Vacant(vacant) => {
                    inner.order.push_back(vacant.key().clone());
                    vacant.insert(value);
                }
            }
        }
        if was_empty {
            self.ready.notify_one();
        }
    }

    /// Pop the merged value for the oldest surviving key, or `None`
    /// when the queue is empty.
    pub fn pop(&self) -> Option<V> {
        let mut inner = self.inner.lock();
        let k = inner.order.pop_front()?;
        inner.values.remove(&k)
    }

    /// Wait for the next empty-to-non-empty transition. A transition
    /// that happened while the consumer was away is remembered, so the
    /// single consumer never misses a wake.
    pub async fn ready(&self) {
        self.ready.notified().await;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Quote, Symbol, Trade};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn quote(symbol: &str, bid: Decimal) -> Quote {
        Quote {
            symbol: Symbol::new(symbol),
            bid_px: bid,
            bid_size: dec!(100),
            ask_px: bid + dec!(1),
            ask_size: dec!(100),
        }
    }

    #[test]
    fn pops_follow_first_insertion_order() {
        let queue = ConflatingQueue::new(|q: &Quote| q.symbol.clone());
        queue.push(quote("A", dec!(1)));
        queue.push(quote("B", dec!(2)));
        queue.push(quote("A", dec!(3))); // conflates, does not reorder
        queue.push(quote("C", dec!(4)));

        assert_eq!(queue.pop().unwrap().symbol, Symbol::new("A"));
        assert_eq!(queue.pop().unwrap().symbol, Symbol::new("B"));
        assert_eq!(queue.pop().unwrap().symbol, Symbol::new("C"));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn repeated_quotes_keep_only_the_latest() {
        let queue = ConflatingQueue::new(|q: &Quote| q.symbol.clone());
        for i in 1..=10_000i64 {
            queue.push(quote("X", Decimal::from(i)));
        }
        assert_eq!(queue.len(), 1);
        let survivor = queue.pop().unwrap();
        assert_eq!(survivor.bid_px, dec!(10000));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn repeated_trades_accumulate_size_weighted() {
        let queue = ConflatingQueue::with_conflate(
            |t: &Trade| t.symbol.clone(),
            |existing: &mut Trade, latest| existing.aggregate(&latest, 8),
        );
        let mut notional = Decimal::ZERO;
        let mut volume = Decimal::ZERO;
        for i in 1..=100i64 {
            let qty = Decimal::from(i);
            let px = Decimal::from(1000 + i);
            notional += qty * px;
            volume += qty;
            queue.push(Trade::new(Symbol::new("X"), qty, px));
        }
        let survivor = queue.pop().unwrap();
        assert_eq!(survivor.trade_volume, volume);
        assert_eq!(survivor.avg_px, (notional / volume).round_dp(8));
    }

    #[tokio::test]
    async fn readiness_fires_once_per_empty_transition() {
        let queue = ConflatingQueue::new(|q: &Quote| q.symbol.clone());

        queue.push(quote("A", dec!(1)));
        queue.push(quote("B", dec!(2)));

        // The transition is remembered even though nobody was waiting.
        tokio::time::timeout(Duration::from_millis(10), queue.ready())
            .await
            .expect("ready after push");

        // Drained: no further signal until the next transition.
        while queue.pop().is_some() {}
        assert!(
            tokio::time::timeout(Duration::from_millis(10), queue.ready())
                .await
                .is_err()
        );

        queue.push(quote("A", dec!(3)));
        tokio::time::timeout(Duration::from_millis(10), queue.ready())
            .await
            .expect("ready after next transition");
    }

    #[tokio::test]
    async fn single_slot_queue_conflates_everything() {
        let queue = ConflatingQueue::with_conflate(
            |_: &Trade| (),
            |existing: &mut Trade, latest| existing.aggregate(&latest, 8),
        );
        queue.push(Trade::new(Symbol::new("X"), dec!(10), dec!(100)));
        queue.push(Trade::new(Symbol::new("X"), dec!(30), dec!(104)));
        let survivor = queue.pop().unwrap();
        assert_eq!(survivor.trade_volume, dec!(40));
        assert_eq!(survivor.avg_px, dec!(103));
    }
}

//! The latency-buffered channel orders cross between the local and exchange processors.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::backtest::models::LatencyModel;
use crate::types::{Order, OrderId};

/// A bus shared by exactly two owners: the endpoint that appends to it and the endpoint
/// that pops from it. `Rc<RefCell<_>>` rather than raw pointers, since the scheduler never
/// touches both ends concurrently but the borrow checker cannot see that across two
/// independently-owned processor structs.
pub type SharedBus = Rc<RefCell<OrderBus>>;

/// A FIFO sequence of `(order, receive_ts)` pairs with monotone receive timestamps,
/// modeling a single network link. Insertion clamps a would-be-earlier timestamp up to the
/// trailing maximum, the same way packets on a real link cannot be reordered ahead of
/// what's already in flight.
#[derive(Debug, Default)]
pub struct OrderBus {
    items: VecDeque<(Order, i64)>,
    /// Reference count per in-flight order id; lets callers answer membership and multi-hop
    /// duplication (the same id can appear more than once while a cancel races a fill) in
    /// O(1) without scanning the queue.
    counts: HashMap<OrderId, usize>,
    /// The receive timestamp of the item at the front of the queue, or `0` when empty.
    frontmost_timestamp: i64,
}

impl OrderBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn frontmost_timestamp(&self) -> i64 {
        self.frontmost_timestamp
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.counts.get(&order_id).is_some_and(|c| *c > 0)
    }

    /// Appends `order` with receive timestamp `ts`, clamped to be non-decreasing.
    pub fn append(&mut self, order: Order, ts: i64) {
        let ts = match self.items.back() {
            Some((_, last_ts)) if ts < *last_ts => *last_ts,
            _ => ts,
        };
        *self.counts.entry(order.order_id).or_insert(0) += 1;
        if self.frontmost_timestamp == 0 || ts < self.frontmost_timestamp {
            self.frontmost_timestamp = ts;
        }
        self.items.push_back((order, ts));
    }

    /// Removes and returns the front item if its receive timestamp is `<= upto`; updates
    /// `frontmost_timestamp` to the new head's timestamp, or `0` if now empty.
    pub fn pop_ready(&mut self, upto: i64) -> Option<(Order, i64)> {
        match self.items.front() {
            Some((_, ts)) if *ts <= upto => {
                let (order, ts) = self.items.pop_front().unwrap();
                if let Some(c) = self.counts.get_mut(&order.order_id) {
                    *c -= 1;
                    if *c == 0 {
                        self.counts.remove(&order.order_id);
                    }
                }
                self.frontmost_timestamp = self.items.front().map(|(_, t)| *t).unwrap_or(0);
                Some((order, ts))
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.counts.clear();
        self.frontmost_timestamp = 0;
    }
}

/// The local processor's outbound/inbound endpoint: applies entry latency when sending a
/// request to the exchange, and hands back whatever the exchange has returned by `timestamp`.
pub struct LocalToExchange<LM: LatencyModel> {
    to_exchange: SharedBus,
    from_exchange: SharedBus,
    latency_model: LM,
}

impl<LM: LatencyModel> LocalToExchange<LM> {
    fn new(to_exchange: SharedBus, from_exchange: SharedBus, latency_model: LM) -> Self {
        Self {
            to_exchange,
            from_exchange,
            latency_model,
        }
    }

    /// Submits `order`, computing its receive timestamp at the exchange via the entry
    /// latency model. A negative latency means the exchange rejects the request outright;
    /// `on_reject` lets the caller mark the local copy accordingly.
    pub fn request(&mut self, timestamp: i64, mut order: Order, on_reject: impl FnOnce(&mut Order)) {
        let latency = self.latency_model.entry(timestamp, &order);
        if latency < 0 {
            on_reject(&mut order);
        }
        order.local_timestamp = timestamp;
        self.to_exchange.borrow_mut().append(order, timestamp + latency.abs());
    }

    pub fn receive(&mut self, timestamp: i64) -> Option<Order> {
        self.from_exchange.borrow_mut().pop_ready(timestamp).map(|(o, _)| o)
    }

    pub fn earliest_recv_order_timestamp(&self) -> i64 {
        self.from_exchange.borrow().frontmost_timestamp()
    }

    pub fn earliest_send_order_timestamp(&self) -> i64 {
        self.to_exchange.borrow().frontmost_timestamp()
    }
}

/// The exchange processor's endpoint: pulls requests once they arrive, and pushes
/// acknowledgements/fills back with response latency applied.
pub struct ExchangeToLocal<LM: LatencyModel> {
    from_local: SharedBus,
    to_local: SharedBus,
    latency_model: LM,
}

impl<LM: LatencyModel> ExchangeToLocal<LM> {
    fn new(from_local: SharedBus, to_local: SharedBus, latency_model: LM) -> Self {
        Self {
            from_local,
            to_local,
            latency_model,
        }
    }

    pub fn receive(&mut self, timestamp: i64) -> Option<(Order, i64)> {
        self.from_local.borrow_mut().pop_ready(timestamp)
    }

    /// Pushes `order` back to the local side, applying response latency measured from
    /// `timestamp` (the exchange's current clock).
    pub fn respond(&mut self, timestamp: i64, mut order: Order) {
        let latency = self.latency_model.response(timestamp, &order).max(0);
        order.exch_timestamp = timestamp;
        self.to_local.borrow_mut().append(order, timestamp + latency);
    }

    pub fn earliest_recv_order_timestamp(&self) -> i64 {
        self.from_local.borrow().frontmost_timestamp()
    }

    pub fn earliest_send_order_timestamp(&self) -> i64 {
        self.to_local.borrow().frontmost_timestamp()
    }
}

/// Builds a linked pair of buses and wraps each end with its latency-aware endpoint. Both
/// endpoints share the same two `OrderBus` instances: what `LocalToExchange` appends to,
/// `ExchangeToLocal` pops from, and vice versa.
pub fn order_channel<LM: LatencyModel + Clone>(
    latency_model: LM,
) -> (LocalToExchange<LM>, ExchangeToLocal<LM>) {
    let local_to_exch: SharedBus = Rc::new(RefCell::new(OrderBus::new()));
    let exch_to_local: SharedBus = Rc::new(RefCell::new(OrderBus::new()));
    let local_end = LocalToExchange::new(local_to_exch.clone(), exch_to_local.clone(), latency_model.clone());
    let exch_end = ExchangeToLocal::new(local_to_exch, exch_to_local, latency_model);
    (local_end, exch_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrdType, Side, TimeInForce};

    fn order(id: OrderId) -> Order {
        Order::new(id, 100, 0.01, 1.0, Side::Buy, OrdType::Limit, TimeInForce::GTC)
    }

    #[test]
    fn append_clamps_non_decreasing_timestamps() {
        let mut bus = OrderBus::new();
        bus.append(order(1), 100);
        bus.append(order(2), 50);
        let (_, ts1) = bus.pop_ready(1000).unwrap();
        let (_, ts2) = bus.pop_ready(1000).unwrap();
        assert_eq!(ts1, 100);
        assert_eq!(ts2, 100);
    }

    #[test]
    fn frontmost_timestamp_resets_to_zero_when_empty() {
        let mut bus = OrderBus::new();
        bus.append(order(1), 10);
        assert_eq!(bus.frontmost_timestamp(), 10);
        bus.pop_ready(100);
        assert_eq!(bus.frontmost_timestamp(), 0);
    }

    #[test]
    fn contains_tracks_duplicate_in_flight_ids() {
        let mut bus = OrderBus::new();
        bus.append(order(1), 10);
        bus.append(order(1), 20);
        assert!(bus.contains(1));
        bus.pop_ready(10);
        assert!(bus.contains(1));
        bus.pop_ready(20);
        assert!(!bus.contains(1));
    }
}

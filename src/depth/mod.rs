//! L2 market depth: per-side price-tick maps with cached best-bid/best-ask extrema.

mod hashmap;

pub use hashmap::HashMapMarketDepth;

use crate::types::{Event, EventKind, Side};

/// Sentinel returned for the best tick on an empty side.
pub const INVALID_MIN: i64 = i64::MIN;
pub const INVALID_MAX: i64 = i64::MAX;

/// Constructs an empty depth replica for a given tick/lot size. Kept separate from
/// [`MarketDepth`] so a depth type that cannot be built from just these two numbers (e.g. a
/// live order-book snapshot wrapper) can still implement the read/write traits without
/// satisfying this one.
pub trait NewMarketDepth: MarketDepth {
    fn new(tick_size: f64, lot_size: f64) -> Self;
}

/// Read-only view of the current top-of-book and tick/lot sizing.
pub trait MarketDepth {
    fn best_bid(&self) -> f64;
    fn best_ask(&self) -> f64;
    fn best_bid_tick(&self) -> i64;
    fn best_ask_tick(&self) -> i64;
    fn best_bid_qty(&self) -> f64;
    fn best_ask_qty(&self) -> f64;
    fn tick_size(&self) -> f64;
    fn lot_size(&self) -> f64;
    fn bid_qty_at_tick(&self, price_tick: i64) -> f64;
    fn ask_qty_at_tick(&self, price_tick: i64) -> f64;

    /// The mid price, or `NaN` if either side is empty.
    fn mid(&self) -> f64 {
        (self.best_bid() + self.best_ask()) / 2.0
    }
}

/// Mutating operations an L2 depth replica supports in response to historical rows.
///
/// Every method returns `(price_tick, prev_best_tick, new_best_tick, prev_qty, new_qty)` so
/// that callers (the exchange processor's queue model hooks, in particular) can react to
/// exactly what changed without re-querying the map.
pub trait L2MarketDepth: MarketDepth {
    fn update_bid_depth(&mut self, price: f64, qty: f64, timestamp: i64) -> DepthUpdate;
    fn update_ask_depth(&mut self, price: f64, qty: f64, timestamp: i64) -> DepthUpdate;

    /// Clears `side` from its current best price up to and including `clear_upto_price`.
    /// `Side::None` clears both sides entirely (used for start-of-day resets).
    fn clear_depth(&mut self, side: Side, clear_upto_price: f64);
}

#[derive(Clone, Copy, Debug)]
pub struct DepthUpdate {
    pub price_tick: i64,
    pub prev_best_tick: i64,
    pub new_best_tick: i64,
    pub prev_qty: f64,
    pub new_qty: f64,
    pub timestamp: i64,
}

/// Applies a full-book snapshot and reports one for recorder/bootstrap purposes.
pub trait ApplySnapshot {
    fn apply_snapshot(&mut self, data: &[Event]);
    fn snapshot(&self) -> Vec<Event>;
}

/// Dispatches one historical row to the depth replica's mutating operations, applied by
/// both the local and exchange processors whenever they consume a data-feed row.
pub fn apply_event<D: L2MarketDepth>(depth: &mut D, ev: &Event, timestamp: i64) -> Option<DepthUpdate> {
    match ev.kind() {
        EventKind::DepthClear => {
            depth.clear_depth(ev.side(), ev.price);
            None
        }
        EventKind::Depth | EventKind::DepthSnapshot => match ev.side() {
            Side::Buy => Some(depth.update_bid_depth(ev.price, ev.qty, timestamp)),
            Side::Sell => Some(depth.update_ask_depth(ev.price, ev.qty, timestamp)),
            Side::None => None,
        },
        EventKind::Trade => None,
    }
}

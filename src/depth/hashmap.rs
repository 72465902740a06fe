use std::collections::HashMap;

use crate::depth::{ApplySnapshot, DepthUpdate, INVALID_MAX, INVALID_MIN, L2MarketDepth, MarketDepth, NewMarketDepth};
use crate::types::{Event, EventKind, Side};

/// Scans outward from `from_tick` (exclusive) in `direction` for the next tick holding a
/// non-zero quantity. Used to re-establish the best-price cache after the previous best is
/// removed, since a plain hash map cannot answer "what's the next key below this one" in
/// constant time.
fn scan_for_depth(depth: &HashMap<i64, f64>, from_tick: i64, to_tick: i64, direction: i64) -> i64 {
    let mut tick = from_tick + direction;
    while tick * direction <= to_tick * direction {
        if let Some(qty) = depth.get(&tick) {
            if *qty > 0.0 {
                return tick;
            }
        }
        tick += direction;
    }
    if direction < 0 {
        INVALID_MIN
    } else {
        INVALID_MAX
    }
}

/// An L2 market depth replica backed by two hash maps keyed by integer price tick, with the
/// best-bid/best-ask ticks cached and maintained incrementally.
///
/// A hash map rather than an ordered map: depth feeds are diffs, not inserts/removes in
/// sorted order, and a missed update for the current best price is recovered by scanning
/// outward from the last known best rather than relying on map ordering.
#[derive(Clone, Debug)]
pub struct HashMapMarketDepth {
    tick_size: f64,
    lot_size: f64,
    timestamp: i64,
    bid_depth: HashMap<i64, f64>,
    ask_depth: HashMap<i64, f64>,
    best_bid_tick: i64,
    best_ask_tick: i64,
    low_bid_tick: i64,
    high_ask_tick: i64,
}

impl HashMapMarketDepth {
    pub fn new(tick_size: f64, lot_size: f64) -> Self {
        Self {
            tick_size,
            lot_size,
            timestamp: 0,
            bid_depth: HashMap::new(),
            ask_depth: HashMap::new(),
            best_bid_tick: INVALID_MIN,
            best_ask_tick: INVALID_MAX,
            low_bid_tick: INVALID_MAX,
            high_ask_tick: INVALID_MIN,
        }
    }

    fn set_bid(&mut self, price_tick: i64, qty: f64) -> f64 {
        let prev_qty = if qty > 0.0 {
            self.bid_depth.insert(price_tick, qty).unwrap_or(0.0)
        } else {
            self.bid_depth.remove(&price_tick).unwrap_or(0.0)
        };
        if price_tick < self.low_bid_tick {
            self.low_bid_tick = price_tick;
        }
        prev_qty
    }

    fn set_ask(&mut self, price_tick: i64, qty: f64) -> f64 {
        let prev_qty = if qty > 0.0 {
            self.ask_depth.insert(price_tick, qty).unwrap_or(0.0)
        } else {
            self.ask_depth.remove(&price_tick).unwrap_or(0.0)
        };
        if price_tick > self.high_ask_tick {
            self.high_ask_tick = price_tick;
        }
        prev_qty
    }
}

impl NewMarketDepth for HashMapMarketDepth {
    fn new(tick_size: f64, lot_size: f64) -> Self {
        HashMapMarketDepth::new(tick_size, lot_size)
    }
}

impl MarketDepth for HashMapMarketDepth {
    fn best_bid(&self) -> f64 {
        if self.best_bid_tick == INVALID_MIN {
            f64::NAN
        } else {
            self.best_bid_tick as f64 * self.tick_size
        }
    }

    fn best_ask(&self) -> f64 {
        if self.best_ask_tick == INVALID_MAX {
            f64::NAN
        } else {
            self.best_ask_tick as f64 * self.tick_size
        }
    }

    fn best_bid_tick(&self) -> i64 {
        self.best_bid_tick
    }

    fn best_ask_tick(&self) -> i64 {
        self.best_ask_tick
    }

    fn best_bid_qty(&self) -> f64 {
        self.bid_qty_at_tick(self.best_bid_tick)
    }

    fn best_ask_qty(&self) -> f64 {
        self.ask_qty_at_tick(self.best_ask_tick)
    }

    fn tick_size(&self) -> f64 {
        self.tick_size
    }

    fn lot_size(&self) -> f64 {
        self.lot_size
    }

    fn bid_qty_at_tick(&self, price_tick: i64) -> f64 {
        *self.bid_depth.get(&price_tick).unwrap_or(&0.0)
    }

    fn ask_qty_at_tick(&self, price_tick: i64) -> f64 {
        *self.ask_depth.get(&price_tick).unwrap_or(&0.0)
    }
}

impl L2MarketDepth for HashMapMarketDepth {
    fn update_bid_depth(&mut self, price: f64, qty: f64, timestamp: i64) -> DepthUpdate {
        let price_tick = (price / self.tick_size).round() as i64;
        let prev_best = self.best_bid_tick;
        let prev_qty = self.set_bid(price_tick, qty);

        if qty > 0.0 {
            if price_tick > self.best_bid_tick || self.best_bid_tick == INVALID_MIN {
                self.best_bid_tick = price_tick;
                if self.best_ask_tick != INVALID_MAX && self.best_bid_tick >= self.best_ask_tick {
                    // The incoming bid crossed the cached ask; the ask side is stale, rescan.
                    self.best_ask_tick =
                        scan_for_depth(&self.ask_depth, self.best_bid_tick - 1, self.high_ask_tick, 1);
                }
            }
        } else if price_tick == self.best_bid_tick {
            self.best_bid_tick = scan_for_depth(&self.bid_depth, price_tick, self.low_bid_tick, -1);
        }

        self.timestamp = timestamp;
        DepthUpdate {
            price_tick,
            prev_best_tick: prev_best,
            new_best_tick: self.best_bid_tick,
            prev_qty,
            new_qty: qty,
            timestamp,
        }
    }

    fn update_ask_depth(&mut self, price: f64, qty: f64, timestamp: i64) -> DepthUpdate {
        let price_tick = (price / self.tick_size).round() as i64;
        let prev_best = self.best_ask_tick;
        let prev_qty = self.set_ask(price_tick, qty);

        if qty > 0.0 {
            if price_tick < self.best_ask_tick || self.best_ask_tick == INVALID_MAX {
                self.best_ask_tick = price_tick;
                if self.best_bid_tick != INVALID_MIN && self.best_ask_tick <= self.best_bid_tick {
                    self.best_bid_tick =
                        scan_for_depth(&self.bid_depth, self.best_ask_tick + 1, self.low_bid_tick, -1);
                }
            }
        } else if price_tick == self.best_ask_tick {
            self.best_ask_tick = scan_for_depth(&self.ask_depth, price_tick, self.high_ask_tick, 1);
        }

        self.timestamp = timestamp;
        DepthUpdate {
            price_tick,
            prev_best_tick: prev_best,
            new_best_tick: self.best_ask_tick,
            prev_qty,
            new_qty: qty,
            timestamp,
        }
    }

    fn clear_depth(&mut self, side: Side, clear_upto_price: f64) {
        let clear_upto_tick = (clear_upto_price / self.tick_size).round() as i64;
        match side {
            Side::Buy => {
                if self.best_bid_tick != INVALID_MIN {
                    self.bid_depth.retain(|tick, _| *tick < clear_upto_tick);
                    self.best_bid_tick = scan_for_depth(&self.bid_depth, clear_upto_tick, self.low_bid_tick, -1);
                }
            }
            Side::Sell => {
                if self.best_ask_tick != INVALID_MAX {
                    self.ask_depth.retain(|tick, _| *tick > clear_upto_tick);
                    self.best_ask_tick = scan_for_depth(&self.ask_depth, clear_upto_tick, self.high_ask_tick, 1);
                }
            }
            Side::None => {
                self.bid_depth.clear();
                self.ask_depth.clear();
                self.best_bid_tick = INVALID_MIN;
                self.best_ask_tick = INVALID_MAX;
                self.low_bid_tick = INVALID_MAX;
                self.high_ask_tick = INVALID_MIN;
            }
        }
    }
}

impl ApplySnapshot for HashMapMarketDepth {
    fn apply_snapshot(&mut self, data: &[Event]) {
        self.clear_depth(Side::None, 0.0);
        for ev in data {
            match ev.side() {
                Side::Buy => {
                    self.update_bid_depth(ev.price, ev.qty, ev.local_ts);
                }
                Side::Sell => {
                    self.update_ask_depth(ev.price, ev.qty, ev.local_ts);
                }
                Side::None => {}
            }
        }
    }

    fn snapshot(&self) -> Vec<Event> {
        let mut rows = Vec::with_capacity(self.bid_depth.len() + self.ask_depth.len());
        for (&tick, &qty) in self.bid_depth.iter() {
            rows.push(Event::new(
                EventKind::DepthSnapshot,
                self.timestamp,
                self.timestamp,
                Side::Buy,
                tick as f64 * self.tick_size,
                qty,
            ));
        }
        for (&tick, &qty) in self.ask_depth.iter() {
            rows.push(Event::new(
                EventKind::DepthSnapshot,
                self.timestamp,
                self.timestamp,
                Side::Sell,
                tick as f64 * self.tick_size,
                qty,
            ));
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth() -> HashMapMarketDepth {
        HashMapMarketDepth::new(0.01, 1.0)
    }

    #[test]
    fn best_prices_track_inserts_and_removals() {
        let mut d = depth();
        d.update_bid_depth(100.00, 5.0, 1);
        d.update_ask_depth(100.01, 5.0, 1);
        assert_eq!(d.best_bid_tick(), 10000);
        assert_eq!(d.best_ask_tick(), 10001);

        d.update_bid_depth(100.00, 0.0, 2);
        assert_eq!(d.best_bid_tick(), INVALID_MIN);
        assert!(d.best_bid().is_nan());
    }

    #[test]
    fn removing_best_falls_back_to_next_resting_tick() {
        let mut d = depth();
        d.update_bid_depth(100.00, 5.0, 1);
        d.update_bid_depth(99.99, 3.0, 1);
        assert_eq!(d.best_bid_tick(), 10000);

        d.update_bid_depth(100.00, 0.0, 2);
        assert_eq!(d.best_bid_tick(), 9999);
        assert_eq!(d.bid_qty_at_tick(9999), 3.0);
    }

    #[test]
    fn clear_depth_removes_up_to_given_price() {
        let mut d = depth();
        d.update_bid_depth(100.00, 5.0, 1);
        d.update_bid_depth(99.99, 3.0, 1);
        d.update_bid_depth(99.98, 1.0, 1);
        d.clear_depth(Side::Buy, 99.99);
        assert_eq!(d.bid_qty_at_tick(10000), 0.0);
        assert_eq!(d.bid_qty_at_tick(9999), 0.0);
        assert_eq!(d.bid_qty_at_tick(9998), 1.0);
    }
}

//! Queue-position models: estimate how much quantity sits ahead of a resting order so the
//! exchange processor knows when it has reached the front of the line.

use crate::depth::MarketDepth;
use crate::types::{Order, QueueScratch};

/// Estimates queue position for a resting order and decides when it has been reached by
/// the matching engine.
///
/// `new_order` seeds the order's scratch space when it starts resting; `trade` and `depth`
/// update it as same-price trades and book diffs arrive; `is_filled` converts the current
/// scratch state into a fill decision and quantity.
pub trait QueueModel<MD: MarketDepth> {
    fn new_order(&self, order: &mut Order, depth: &MD);
    fn trade(&self, order: &mut Order, trade_qty: f64, depth: &MD);
    fn depth(&self, order: &mut Order, prev_qty: f64, new_qty: f64, depth: &MD);
    fn is_filled(&self, order: &Order, depth: &MD) -> f64;
}

/// The conservative model: a resting order's position only advances when a trade prints at
/// its price, never merely because the book thins out (a thinning book could just as well
/// be cancellations ahead of this order, which a risk-averse estimate refuses to credit).
#[derive(Clone, Copy, Debug, Default)]
pub struct RiskAverseQueueModel;

impl<MD: MarketDepth> QueueModel<MD> for RiskAverseQueueModel {
    fn new_order(&self, order: &mut Order, depth: &MD) {
        let qty_at_tick = match order.side {
            crate::types::Side::Buy => depth.bid_qty_at_tick(order.price_tick),
            crate::types::Side::Sell => depth.ask_qty_at_tick(order.price_tick),
            crate::types::Side::None => 0.0,
        };
        order.q = QueueScratch::AheadQty(qty_at_tick);
    }

    fn trade(&self, order: &mut Order, trade_qty: f64, _depth: &MD) {
        if let QueueScratch::AheadQty(ahead) = &mut order.q {
            *ahead -= trade_qty;
        }
    }

    fn depth(&self, _order: &mut Order, _prev_qty: f64, _new_qty: f64, _depth: &MD) {
        // Book thinning alone never advances a risk-averse queue position.
    }

    fn is_filled(&self, order: &Order, _depth: &MD) -> f64 {
        match order.q {
            QueueScratch::AheadQty(ahead) if ahead <= 0.0 => (-ahead).min(order.leaves_qty),
            _ => 0.0,
        }
    }
}

/// A probability curve mapping an ahead/behind queue split to the fraction of a book-depth
/// decrease that should be credited to this order's queue position.
pub trait Probability {
    fn prob(&self, front: f64, back: f64) -> f64;
}

/// `front / (front + back)` raised to a power `n`; `n = 1` is the classic linear estimate,
/// `n > 1` is more conservative (credits less of the depth decrease to orders further back).
#[derive(Clone, Copy, Debug)]
pub struct PowerProbQueueFunc {
    n: f64,
}

impl PowerProbQueueFunc {
    pub fn new(n: f64) -> Self {
        Self { n }
    }
}

impl Probability for PowerProbQueueFunc {
    fn prob(&self, front: f64, back: f64) -> f64 {
        if front + back <= 0.0 {
            return 1.0;
        }
        (front / (front + back)).powf(self.n)
    }
}

/// `log(1 + front) / log(1 + front + back)`, crediting orders deep in the queue more than
/// a power curve would for the same split.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProbQueueFunc;

impl Probability for LogProbQueueFunc {
    fn prob(&self, front: f64, back: f64) -> f64 {
        if front + back <= 0.0 {
            return 1.0;
        }
        (1.0 + front).ln() / (1.0 + front + back).ln()
    }
}

/// The probabilistic family: in addition to same-price trades, credits a fraction of any
/// depth decrease not already accounted for by an observed trade, per the `P: Probability`
/// curve. `front_q_qty` is the estimated quantity still ahead of this order; `cum_trade_qty`
/// tracks how much of the depth decrease has already been attributed to trades, so it is
/// not double counted when a depth update for the same tick arrives afterward.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProbQueueModel<P: Probability> {
    prob_func: P,
}

impl<P: Probability> ProbQueueModel<P> {
    pub fn new(prob_func: P) -> Self {
        Self { prob_func }
    }
}

impl<P: Probability, MD: MarketDepth> QueueModel<MD> for ProbQueueModel<P> {
    fn new_order(&self, order: &mut Order, depth: &MD) {
        let qty_at_tick = match order.side {
            crate::types::Side::Buy => depth.bid_qty_at_tick(order.price_tick),
            crate::types::Side::Sell => depth.ask_qty_at_tick(order.price_tick),
            crate::types::Side::None => 0.0,
        };
        order.q = QueueScratch::FrontBack {
            front_q_qty: qty_at_tick,
            cum_trade_qty: 0.0,
        };
    }

    fn trade(&self, order: &mut Order, trade_qty: f64, _depth: &MD) {
        if let QueueScratch::FrontBack {
            front_q_qty,
            cum_trade_qty,
        } = &mut order.q
        {
            *front_q_qty -= trade_qty;
            *cum_trade_qty += trade_qty;
        }
    }

    fn depth(&self, order: &mut Order, prev_qty: f64, new_qty: f64, _depth: &MD) {
        if let QueueScratch::FrontBack {
            front_q_qty,
            cum_trade_qty,
        } = &mut order.q
        {
            let chg = prev_qty - new_qty - *cum_trade_qty;
            *cum_trade_qty = 0.0;
            if chg > 0.0 {
                let back = (new_qty - *front_q_qty).max(0.0);
                let prob = self.prob_func.prob(*front_q_qty, back);
                *front_q_qty -= (1.0 - prob) * chg;
            }
        }
    }

    fn is_filled(&self, order: &Order, _depth: &MD) -> f64 {
        match order.q {
            QueueScratch::FrontBack { front_q_qty, .. } if front_q_qty <= 0.0 => {
                (-front_q_qty).min(order.leaves_qty)
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::HashMapMarketDepth;
    use crate::types::{OrdType, Side, TimeInForce};

    #[test]
    fn risk_averse_fills_once_ahead_quantity_is_exhausted() {
        let depth = HashMapMarketDepth::new(0.01, 1.0);
        let model = RiskAverseQueueModel;
        let mut order = Order::new(1, 10000, 0.01, 2.0, Side::Buy, OrdType::Limit, TimeInForce::GTC);
        order.q = QueueScratch::AheadQty(1.0);
        // Not enough trade volume yet to exhaust the one unit ahead of us.
        model.trade(&mut order, 0.5, &depth);
        assert_eq!(model.is_filled(&order, &depth), 0.0);
        // The rest of the ahead quantity trades away, plus two units beyond it: only our
        // own (smaller) remaining quantity is reported as filled.
        model.trade(&mut order, 2.5, &depth);
        assert_eq!(model.is_filled(&order, &depth), 2.0);
    }

    #[test]
    fn prob_queue_model_partially_credits_depth_decrease() {
        let depth = HashMapMarketDepth::new(0.01, 1.0);
        let model = ProbQueueModel::new(PowerProbQueueFunc::new(1.0));
        let mut order = Order::new(1, 10000, 0.01, 1.0, Side::Buy, OrdType::Limit, TimeInForce::GTC);
        order.q = QueueScratch::FrontBack {
            front_q_qty: 10.0,
            cum_trade_qty: 0.0,
        };
        model.depth(&mut order, 20.0, 5.0, &depth);
        if let QueueScratch::FrontBack { front_q_qty, .. } = order.q {
            assert!(front_q_qty < 10.0);
        } else {
            panic!("expected FrontBack scratch");
        }
    }
}

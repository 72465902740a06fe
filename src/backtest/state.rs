//! Position, balance, and fee bookkeeping.

use crate::backtest::assettype::AssetType;
use crate::types::{Order, StateValues};

/// Tracks position, balance, and accrued fee for one asset, applying fills as they arrive.
#[derive(Clone, Debug)]
pub struct State<AT: AssetType> {
    values: StateValues,
    maker_fee: f64,
    taker_fee: f64,
    asset_type: AT,
}

impl<AT: AssetType> State<AT> {
    pub fn new(maker_fee: f64, taker_fee: f64, asset_type: AT) -> Self {
        Self {
            values: StateValues::default(),
            maker_fee,
            taker_fee,
            asset_type,
        }
    }

    pub fn with_starting_balance(mut self, balance: f64) -> Self {
        self.values.balance = balance;
        self
    }

    /// Applies one fill's PnL and fee to the running state.
    pub fn apply_fill(&mut self, order: &Order) {
        let fee_rate = if order.maker { self.maker_fee } else { self.taker_fee };
        let amount = self.asset_type.amount(order.exec_price(), order.exec_qty);
        let side = order.side.sign();

        self.values.position += order.exec_qty * side;
        self.values.balance -= amount * side;
        self.values.fee += amount * fee_rate;
        self.values.num_trades += 1;
        self.values.trading_volume += order.exec_qty;
        self.values.trading_value += amount;
    }

    /// Mark-to-market equity at the given mid price.
    pub fn equity(&self, mid: f64) -> f64 {
        self.asset_type
            .equity(mid, self.values.balance, self.values.position, self.values.fee)
    }

    pub fn values(&self) -> &StateValues {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::assettype::LinearAsset;
    use crate::types::{OrdType, Order, Side, TimeInForce};

    fn filled_order(side: Side, exec_price_tick: i64, exec_qty: f64, maker: bool) -> Order {
        let mut o = Order::new(1, exec_price_tick, 0.01, exec_qty, side, OrdType::Limit, TimeInForce::GTC);
        o.exec_price_tick = exec_price_tick;
        o.exec_qty = exec_qty;
        o.maker = maker;
        o
    }

    #[test]
    fn buy_fill_increases_position_and_reduces_balance() {
        let mut state = State::new(0.0, 0.0005, LinearAsset::new(1.0)).with_starting_balance(0.0);
        let order = filled_order(Side::Buy, 10000, 1.0, false);
        state.apply_fill(&order);
        assert_eq!(state.values().position, 1.0);
        assert!(state.values().balance < 0.0);
        assert!(state.values().fee > 0.0);
        assert_eq!(state.values().num_trades, 1);
    }
}

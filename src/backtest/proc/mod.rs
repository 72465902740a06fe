//! The two processor roles driven by the scheduler: the local (trader) view and the
//! exchange (matching engine) view.

mod exchange;
mod local;

pub use exchange::Exchange;
pub use local::Local;

use std::collections::HashMap;

use crate::backtest::BacktestError;
use crate::types::{Event, OrdType, Order, OrderId, Side, StateValues, TimeInForce};

/// Either side of the simulation: consumes its own data feed and its own inbound order bus.
pub trait Processor {
    /// Returns this processor's view timestamp for `event`, or `None` if the event belongs
    /// to the other side's feed (the two feeds are interleaved in storage but not in view).
    fn event_seen_timestamp(&self, event: &Event) -> Option<i64>;

    /// Applies one data-feed row.
    fn process_data(&mut self, event: &Event) -> Result<(), BacktestError>;

    /// Drains and processes every inbound order whose receive timestamp is `<= timestamp`.
    /// Returns `true` if `wait_resp_order_id` was among the orders processed.
    fn process_recv_order(
        &mut self,
        timestamp: i64,
        wait_resp_order_id: Option<OrderId>,
    ) -> Result<bool, BacktestError>;

    fn earliest_recv_order_timestamp(&self) -> i64;
    fn earliest_send_order_timestamp(&self) -> i64;
}

/// The local processor's additional surface: order entry and the trader-facing ladder/book.
pub trait LocalProcessor<MD>: Processor {
    fn submit_order(
        &mut self,
        order_id: OrderId,
        side: Side,
        price: f64,
        qty: f64,
        order_type: OrdType,
        time_in_force: TimeInForce,
        current_timestamp: i64,
    ) -> Result<(), BacktestError>;

    fn cancel(&mut self, order_id: OrderId, current_timestamp: i64) -> Result<(), BacktestError>;

    fn clear_inactive_orders(&mut self);

    fn position(&self) -> f64;
    fn state_values(&self) -> &StateValues;
    fn equity(&self, mid: f64) -> f64;
    fn depth(&self) -> &MD;
    fn orders(&self) -> &HashMap<OrderId, Order>;
    fn last_trades(&self) -> &[Event];
    fn clear_last_trades(&mut self);
}

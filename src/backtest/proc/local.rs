use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::backtest::assettype::AssetType;
use crate::backtest::models::LatencyModel;
use crate::backtest::order::LocalToExchange;
use crate::backtest::proc::{LocalProcessor, Processor};
use crate::backtest::state::State;
use crate::backtest::BacktestError;
use crate::depth::{apply_event, L2MarketDepth, MarketDepth};
use crate::types::{Event, OrdType, Order, OrderId, Req, Side, StateValues, Status, TimeInForce};

/// The trader's view: its own depth replica, its own copy of the order ladder, and the
/// local end of the latency-buffered order channel.
pub struct Local<AT, LM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    MD: MarketDepth,
{
    orders: HashMap<OrderId, Order>,
    channel: LocalToExchange<LM>,
    depth: MD,
    state: State<AT>,
    trades: Vec<Event>,
}

impl<AT, LM, MD> Local<AT, LM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    MD: MarketDepth,
{
    pub fn new(depth: MD, state: State<AT>, last_trades_cap: usize, channel: LocalToExchange<LM>) -> Self {
        Self {
            orders: HashMap::new(),
            channel,
            depth,
            state,
            trades: Vec::with_capacity(last_trades_cap),
        }
    }

    fn reconcile(&mut self, order: Order) {
        match self.orders.entry(order.order_id) {
            Entry::Occupied(mut entry) => {
                let local_order = entry.get_mut();
                if order.req == Req::None && order.status == Status::Rejected {
                    // A request this ladder issued bounced off the exchange: unwind the
                    // local-side optimistic state rather than keep a phantom request open.
                    if local_order.req == Req::New {
                        local_order.req = Req::None;
                        local_order.status = Status::Expired;
                    } else {
                        local_order.req = Req::None;
                    }
                } else {
                    // `exec_qty > 0` is what marks this response as carrying a *new* fill
                    // delta, not just an echo of a terminal status (e.g. a cancel-reject
                    // response for an order already filled) that would otherwise double-
                    // count the trade.
                    if (order.status == Status::Filled || order.status == Status::PartiallyFilled) && order.exec_qty > 0.0 {
                        self.state.apply_fill(&order);
                    }
                    local_order.update(&order);
                }
            }
            Entry::Vacant(entry) => {
                if (order.status == Status::Filled || order.status == Status::PartiallyFilled) && order.exec_qty > 0.0 {
                    self.state.apply_fill(&order);
                }
                entry.insert(order);
            }
        }
    }
}

impl<AT, LM, MD> LocalProcessor<MD> for Local<AT, LM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    MD: MarketDepth + L2MarketDepth,
{
    fn submit_order(
        &mut self,
        order_id: OrderId,
        side: Side,
        price: f64,
        qty: f64,
        order_type: OrdType,
        time_in_force: TimeInForce,
        current_timestamp: i64,
    ) -> Result<(), BacktestError> {
        if self
            .orders
            .get(&order_id)
            .is_some_and(|o| {
                o.status != Status::Expired
                    && o.status != Status::Filled
                    && o.status != Status::Canceled
                    && o.status != Status::Rejected
            })
        {
            return Err(BacktestError::OrderIdExist(order_id));
        }
        if qty <= 0.0 || price <= 0.0 {
            return Err(BacktestError::InvalidOrderRequest);
        }

        let price_tick = (price / self.depth.tick_size()).round() as i64;
        let mut order = Order::new(order_id, price_tick, self.depth.tick_size(), qty, side, order_type, time_in_force);
        order.req = Req::New;
        order.local_timestamp = current_timestamp;
        self.orders.insert(order_id, order.clone());

        self.channel.request(current_timestamp, order, |o| {
            o.req = Req::None;
            o.status = Status::Rejected;
        });
        Ok(())
    }

    fn cancel(&mut self, order_id: OrderId, current_timestamp: i64) -> Result<(), BacktestError> {
        let order = self.orders.get_mut(&order_id).ok_or(BacktestError::OrderNotFound(order_id))?;
        if order.req != Req::None {
            return Err(BacktestError::OrderRequestInProcess(order_id));
        }
        order.req = Req::Canceled;
        order.local_timestamp = current_timestamp;
        let req = order.clone();

        self.channel.request(current_timestamp, req, |o| {
            o.req = Req::None;
            o.status = Status::Rejected;
        });
        Ok(())
    }

    fn clear_inactive_orders(&mut self) {
        self.orders
            .retain(|_, o| !matches!(o.status, Status::Expired | Status::Filled | Status::Canceled | Status::Rejected));
    }

    fn position(&self) -> f64 {
        self.state.values().position
    }

    fn state_values(&self) -> &StateValues {
        self.state.values()
    }

    fn equity(&self, mid: f64) -> f64 {
        self.state.equity(mid)
    }

    fn depth(&self) -> &MD {
        &self.depth
    }

    fn orders(&self) -> &HashMap<OrderId, Order> {
        &self.orders
    }

    fn last_trades(&self) -> &[Event] {
        &self.trades
    }

    fn clear_last_trades(&mut self) {
        self.trades.clear();
    }
}

impl<AT, LM, MD> Processor for Local<AT, LM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    MD: MarketDepth + L2MarketDepth,
{
    fn event_seen_timestamp(&self, event: &Event) -> Option<i64> {
        Some(event.local_ts)
    }

    fn process_data(&mut self, ev: &Event) -> Result<(), BacktestError> {
        apply_event(&mut self.depth, ev, ev.local_ts);
        if ev.kind() == crate::types::EventKind::Trade && self.trades.capacity() > 0 {
            self.trades.push(ev.clone());
        }
        Ok(())
    }

    fn process_recv_order(
        &mut self,
        timestamp: i64,
        wait_resp_order_id: Option<OrderId>,
    ) -> Result<bool, BacktestError> {
        let mut saw_wait_resp = false;
        while let Some(order) = self.channel.receive(timestamp) {
            if Some(order.order_id) == wait_resp_order_id {
                saw_wait_resp = true;
            }
            self.reconcile(order);
        }
        Ok(saw_wait_resp)
    }

    fn earliest_recv_order_timestamp(&self) -> i64 {
        self.channel.earliest_recv_order_timestamp()
    }

    fn earliest_send_order_timestamp(&self) -> i64 {
        self.channel.earliest_send_order_timestamp()
    }
}

use std::collections::{HashMap, HashSet};

use crate::backtest::assettype::AssetType;
use crate::backtest::models::{LatencyModel, QueueModel};
use crate::backtest::order::ExchangeToLocal;
use crate::backtest::proc::Processor;
use crate::backtest::state::State;
use crate::backtest::BacktestError;
use crate::depth::{L2MarketDepth, MarketDepth};
use crate::types::{Event, EventKind, OrdType, Order, OrderId, Req, Side, Status, TimeInForce};

/// The matching engine: walks the historical depth to fill crossing and marketable orders,
/// and uses the queue model to decide when resting orders at a touched price are reached.
pub struct Exchange<AT, LM, QM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    QM: QueueModel<MD>,
    MD: MarketDepth,
{
    orders: HashMap<OrderId, Order>,
    buy_orders: HashMap<i64, HashSet<OrderId>>,
    sell_orders: HashMap<i64, HashSet<OrderId>>,
    channel: ExchangeToLocal<LM>,
    depth: MD,
    state: State<AT>,
    queue_model: QM,
}

impl<AT, LM, QM, MD> Exchange<AT, LM, QM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    QM: QueueModel<MD>,
    MD: MarketDepth + L2MarketDepth,
{
    pub fn new(depth: MD, state: State<AT>, channel: ExchangeToLocal<LM>, queue_model: QM) -> Self {
        Self {
            orders: HashMap::new(),
            buy_orders: HashMap::new(),
            sell_orders: HashMap::new(),
            channel,
            depth,
            state,
            queue_model,
        }
    }

    fn ladder_mut(&mut self, side: Side) -> &mut HashMap<i64, HashSet<OrderId>> {
        match side {
            Side::Buy => &mut self.buy_orders,
            Side::Sell | Side::None => &mut self.sell_orders,
        }
    }

    fn rest(&mut self, order: Order) {
        let tick = order.price_tick;
        let id = order.order_id;
        let side = order.side;
        self.orders.insert(id, order);
        self.ladder_mut(side).entry(tick).or_default().insert(id);
    }

    fn unrest(&mut self, id: OrderId, tick: i64, side: Side) {
        if let Some(set) = self.ladder_mut(side).get_mut(&tick) {
            set.remove(&id);
            if set.is_empty() {
                self.ladder_mut(side).remove(&tick);
            }
        }
    }

    /// Applies one fill increment to `order_id`, updates state, and ships the response.
    fn fill(&mut self, order_id: OrderId, timestamp: i64, maker: bool, exec_price_tick: i64, exec_qty: f64) {
        let (done, tick, side, resp) = {
            let order = match self.orders.get_mut(&order_id) {
                Some(o) => o,
                None => return,
            };
            let exec_qty = exec_qty.min(order.leaves_qty);
            order.leaves_qty -= exec_qty;
            order.exec_price_tick = if maker { order.price_tick } else { exec_price_tick };
            order.exec_qty = exec_qty;
            order.maker = maker;
            order.exch_timestamp = timestamp;
            order.req = Req::None;
            let lot = self.depth.lot_size().max(1e-12);
            order.status = if order.leaves_qty < lot / 2.0 {
                Status::Filled
            } else {
                Status::PartiallyFilled
            };
            if maker {
                // The queue model's estimate of "quantity ahead" has just been consumed by
                // this fill; zero it so the next trade/depth update starts counting fresh
                // instead of compounding against an already-negative position.
                match &mut order.q {
                    crate::types::QueueScratch::AheadQty(ahead) => *ahead = 0.0,
                    crate::types::QueueScratch::FrontBack { front_q_qty, .. } => *front_q_qty = 0.0,
                    crate::types::QueueScratch::Empty => {}
                }
            }
            self.state.apply_fill(order);
            (order.status == Status::Filled, order.price_tick, order.side, order.clone())
        };
        if done {
            self.orders.remove(&order_id);
            self.unrest(order_id, tick, side);
        }
        self.channel.respond(timestamp, resp);
    }

    /// Computes how much quantity is available between the current best opposite price and
    /// `limit_tick` inclusive (or the whole book when `limit_tick` is `None`, i.e. a market
    /// order), without mutating the book.
    fn available_liquidity(&self, side: Side, limit_tick: Option<i64>) -> f64 {
        let mut total = 0.0;
        match side {
            Side::Buy => {
                let mut tick = self.depth.best_ask_tick();
                while tick != crate::depth::INVALID_MAX && limit_tick.map(|l| tick <= l).unwrap_or(true) {
                    let qty = self.depth.ask_qty_at_tick(tick);
                    if qty > 0.0 {
                        total += qty;
                    }
                    tick += 1;
                    if tick - self.depth.best_ask_tick() > 1_000_000 {
                        break;
                    }
                }
            }
            Side::Sell => {
                let mut tick = self.depth.best_bid_tick();
                while tick != crate::depth::INVALID_MIN && limit_tick.map(|l| tick >= l).unwrap_or(true) {
                    let qty = self.depth.bid_qty_at_tick(tick);
                    if qty > 0.0 {
                        total += qty;
                    }
                    tick -= 1;
                    if self.depth.best_bid_tick() - tick > 1_000_000 {
                        break;
                    }
                }
            }
            Side::None => {}
        }
        total
    }

    /// Walks the opposite side of the book consuming liquidity for a marketable order,
    /// filling one increment per price level touched. Returns the remaining unfilled qty.
    fn walk_and_fill(&mut self, order_id: OrderId, timestamp: i64, side: Side, limit_tick: Option<i64>) -> f64 {
        loop {
            let remaining = self.orders.get(&order_id).map(|o| o.leaves_qty).unwrap_or(0.0);
            if remaining <= 0.0 {
                return 0.0;
            }
            let (tick, qty_at_tick) = match side {
                Side::Buy => (self.depth.best_ask_tick(), self.depth.best_ask_qty()),
                Side::Sell => (self.depth.best_bid_tick(), self.depth.best_bid_qty()),
                Side::None => return remaining,
            };
            let book_exhausted = match side {
                Side::Buy => tick == crate::depth::INVALID_MAX,
                Side::Sell => tick == crate::depth::INVALID_MIN,
                Side::None => true,
            };
            if book_exhausted {
                return remaining;
            }
            if let Some(limit) = limit_tick {
                let crosses = match side {
                    Side::Buy => tick <= limit,
                    Side::Sell => tick >= limit,
                    Side::None => false,
                };
                if !crosses {
                    return remaining;
                }
            }
            let exec_qty = remaining.min(qty_at_tick);
            if exec_qty <= 0.0 {
                return remaining;
            }
            self.fill(order_id, timestamp, false, tick, exec_qty);
            let price = tick as f64 * self.depth.tick_size();
            match side {
                Side::Buy => {
                    self.depth.update_ask_depth(price, qty_at_tick - exec_qty, timestamp);
                }
                Side::Sell => {
                    self.depth.update_bid_depth(price, qty_at_tick - exec_qty, timestamp);
                }
                Side::None => {}
            }
        }
    }

    fn ack_new(&mut self, mut order: Order, timestamp: i64) {
        let opposite_crosses = match order.side {
            Side::Buy => order.price_tick >= self.depth.best_ask_tick() || self.depth.best_ask_tick() == crate::depth::INVALID_MAX && order.order_type == OrdType::Market,
            Side::Sell => order.price_tick <= self.depth.best_bid_tick() || self.depth.best_bid_tick() == crate::depth::INVALID_MIN && order.order_type == OrdType::Market,
            Side::None => false,
        };
        let marketable = order.order_type == OrdType::Market || opposite_crosses;

        if order.time_in_force == TimeInForce::GTX && marketable {
            order.status = Status::Expired;
            order.req = Req::None;
            self.channel.respond(timestamp, order);
            return;
        }

        if !marketable {
            order.status = Status::New;
            order.req = Req::None;
            self.queue_model.new_order(&mut order, &self.depth);
            let resp = order.clone();
            self.rest(order);
            self.channel.respond(timestamp, resp);
            return;
        }

        let limit_tick = if order.order_type == OrdType::Market { None } else { Some(order.price_tick) };

        if order.time_in_force == TimeInForce::FOK {
            let available = self.available_liquidity(order.side, limit_tick);
            if available + 1e-12 < order.leaves_qty {
                order.status = Status::Expired;
                order.req = Req::None;
                self.channel.respond(timestamp, order);
                return;
            }
        }

        let order_id = order.order_id;
        order.status = Status::New;
        order.req = Req::None;
        self.orders.insert(order_id, order);

        let residual = self.walk_and_fill(order_id, timestamp, self.orders[&order_id].side, limit_tick);

        if residual > 0.0 {
            match self.orders.get(&order_id).map(|o| o.time_in_force) {
                Some(TimeInForce::GTC) => {
                    let mut order = self.orders.remove(&order_id).unwrap();
                    order.status = Status::New;
                    self.queue_model.new_order(&mut order, &self.depth);
                    let resp = order.clone();
                    self.rest(order);
                    self.channel.respond(timestamp, resp);
                }
                Some(_) => {
                    if let Some(mut order) = self.orders.remove(&order_id) {
                        order.status = Status::Expired;
                        order.req = Req::None;
                        self.channel.respond(timestamp, order);
                    }
                }
                None => {}
            }
        }
    }

    fn ack_cancel(&mut self, incoming: Order, timestamp: i64) {
        match self.orders.get(&incoming.order_id) {
            Some(existing) if existing.cancellable() => {
                let tick = existing.price_tick;
                let side = existing.side;
                let mut order = self.orders.remove(&incoming.order_id).unwrap();
                self.unrest(incoming.order_id, tick, side);
                order.status = Status::Canceled;
                order.req = Req::None;
                order.exch_timestamp = timestamp;
                self.channel.respond(timestamp, order);
            }
            Some(_) | None => {
                // Either resting but not cancellable right now (a request is already in
                // flight against it), or already gone from the ladder entirely (filled,
                // expired, or canceled by the time this request arrived). Either way the
                // exchange has nothing new to report: respond with a plain reject rather
                // than echoing `incoming`'s quantity/status fields, which can be stale by
                // the time this reaches `Local::reconcile` (e.g. a fill that raced this
                // cancel and already updated the local copy) and would otherwise regress it.
                let mut order = incoming;
                order.req = Req::None;
                order.status = Status::Rejected;
                self.channel.respond(timestamp, order);
            }
        }
    }
}

impl<AT, LM, QM, MD> Processor for Exchange<AT, LM, QM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    QM: QueueModel<MD>,
    MD: MarketDepth + L2MarketDepth,
{
    fn event_seen_timestamp(&self, event: &Event) -> Option<i64> {
        Some(event.exch_ts)
    }

    fn process_data(&mut self, ev: &Event) -> Result<(), BacktestError> {
        match ev.kind() {
            EventKind::Trade => {
                let tick = (ev.price / self.depth.tick_size()).round() as i64;
                let passive_side = match ev.side() {
                    Side::Buy => Side::Sell,
                    Side::Sell => Side::Buy,
                    Side::None => return Ok(()),
                };
                let ids: Vec<OrderId> = self
                    .ladder_mut(passive_side)
                    .get(&tick)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                // Every resting order at this exact tick sees the same trade print; the
                // queue model, not the trade price itself, decides how much of it is ours.
                for id in ids {
                    if let Some(order) = self.orders.get_mut(&id) {
                        self.queue_model.trade(order, ev.qty, &self.depth);
                    }
                    let exec = self.orders.get(&id).map(|o| self.queue_model.is_filled(o, &self.depth)).unwrap_or(0.0);
                    if exec > 0.0 {
                        self.fill(id, ev.exch_ts, true, tick, exec);
                    }
                }
            }
            EventKind::Depth | EventKind::DepthSnapshot => {
                let side = ev.side();
                let update = match side {
                    Side::Buy => Some(self.depth.update_bid_depth(ev.price, ev.qty, ev.exch_ts)),
                    Side::Sell => Some(self.depth.update_ask_depth(ev.price, ev.qty, ev.exch_ts)),
                    Side::None => None,
                };
                if let Some(u) = update {
                    let ids: Vec<OrderId> = self
                        .ladder_mut(side)
                        .get(&u.price_tick)
                        .map(|s| s.iter().copied().collect())
                        .unwrap_or_default();
                    for id in ids {
                        if let Some(order) = self.orders.get_mut(&id) {
                            self.queue_model.depth(order, u.prev_qty, u.new_qty, &self.depth);
                        }
                        let exec = self.orders.get(&id).map(|o| self.queue_model.is_filled(o, &self.depth)).unwrap_or(0.0);
                        if exec > 0.0 {
                            self.fill(id, ev.exch_ts, true, u.price_tick, exec);
                        }
                    }
                }
            }
            EventKind::DepthClear => {
                self.depth.clear_depth(ev.side(), ev.price);
            }
        }
        Ok(())
    }

    fn process_recv_order(
        &mut self,
        timestamp: i64,
        wait_resp_order_id: Option<OrderId>,
    ) -> Result<bool, BacktestError> {
        let mut saw_wait_resp = false;
        while let Some((order, _)) = self.channel.receive(timestamp) {
            if Some(order.order_id) == wait_resp_order_id {
                saw_wait_resp = true;
            }
            match order.req {
                Req::New => self.ack_new(order, timestamp),
                Req::Canceled => self.ack_cancel(order, timestamp),
                Req::None | Req::Modify => {}
            }
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

//! Fixed-layout records shared by every component: the historical event row, the order
//! record that crosses the local/exchange boundary, and the small enums that tag them.

use npyz::{AutoSerialize, Deserialize, Serialize};

/// A unique identifier for an order, scoped to a single backtest run.
pub type OrderId = u64;

/// Sentinel used by [`crate::backtest::scheduler::Scheduler::elapse`] to mean "run to the
/// end of the data".
pub const UNTIL_END_OF_DATA: i64 = i64::MAX;

/// The kind of row carried by the historical event stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum EventKind {
    /// A single price-level diff: `qty` is the new size resting at `price`, `0` removes it.
    Depth = 1,
    /// A public trade print; `side` is the aggressor side.
    Trade = 2,
    /// Clears one side of the book from the best price up to and including `price`.
    DepthClear = 3,
    /// One row of a start-of-day (or periodic) full-book snapshot.
    DepthSnapshot = 4,
}

/// The side of the book, or the aggressor side of a trade.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i8)]
pub enum Side {
    Buy = 1,
    Sell = -1,
    None = 0,
}

impl Side {
    /// The multiplicative sign used in position and notional arithmetic.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
            Side::None => 0.0,
        }
    }
}

/// One historical row: a book update or a trade print, timestamped on both sides of the
/// feed latency boundary.
#[derive(Clone, Debug, Serialize, Deserialize, AutoSerialize)]
pub struct Event {
    pub kind: u8,
    pub exch_ts: i64,
    pub local_ts: i64,
    pub side: i8,
    pub price: f64,
    pub qty: f64,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self.kind {
            1 => EventKind::Depth,
            2 => EventKind::Trade,
            3 => EventKind::DepthClear,
            4 => EventKind::DepthSnapshot,
            other => panic!("invalid event kind {other}"),
        }
    }

    pub fn side(&self) -> Side {
        match self.side {
            1 => Side::Buy,
            -1 => Side::Sell,
            _ => Side::None,
        }
    }

    pub fn new(kind: EventKind, exch_ts: i64, local_ts: i64, side: Side, price: f64, qty: f64) -> Self {
        Self {
            kind: kind as u8,
            exch_ts,
            local_ts,
            side: side as i8,
            price,
            qty,
        }
    }
}

/// Order type: a resting limit order, or a market order that walks the book immediately.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrdType {
    Limit,
    Market,
}

/// Time-in-force instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeInForce {
    /// Good-till-canceled: rests in the book until filled or canceled.
    GTC,
    /// Good-till-crossing (post-only): expires immediately if it would cross the book.
    GTX,
    /// Fill-or-kill: fills the entire quantity immediately, or expires untouched.
    FOK,
    /// Immediate-or-cancel: fills whatever is immediately available, expires the residual.
    IOC,
}

/// The order's lifecycle status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    None,
    New,
    Expired,
    Filled,
    Canceled,
    PartiallyFilled,
    /// An in-flight modify has been accepted and applied.
    Modify,
    Rejected,
}

/// An in-flight request marker distinguishing "no request pending" from a request the
/// exchange has not yet acknowledged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Req {
    None,
    New,
    Canceled,
    Modify,
}

/// Per-order scratch space owned by the active [`crate::backtest::models::QueueModel`].
///
/// A closed enum rather than a type-erased `Box<dyn Any>`: the set of queue models this
/// crate ships is fixed, so each variant names exactly the state its family needs.
#[derive(Clone, Copy, Debug)]
pub enum QueueScratch {
    /// No queue-position tracking (used before a queue model has touched the order).
    Empty,
    /// A single ahead-of-queue quantity, used by [`crate::backtest::models::RiskAverseQueueModel`].
    AheadQty(f64),
    /// Ahead and behind quantities, used by [`crate::backtest::models::ProbQueueModel`].
    FrontBack { front_q_qty: f64, cum_trade_qty: f64 },
}

impl Default for QueueScratch {
    fn default() -> Self {
        QueueScratch::Empty
    }
}

/// An order record. Owned exclusively by whichever ladder (local or exchange) currently
/// holds it; crossing the order bus is always a value copy, never a shared reference.
#[derive(Clone, Debug)]
pub struct Order {
    pub order_id: OrderId,
    pub price_tick: i64,
    pub tick_size: f64,
    pub qty: f64,
    pub leaves_qty: f64,
    pub side: Side,
    pub order_type: OrdType,
    pub time_in_force: TimeInForce,
    pub status: Status,
    pub req: Req,
    pub exec_price_tick: i64,
    pub exec_qty: f64,
    pub exch_timestamp: i64,
    pub local_timestamp: i64,
    pub maker: bool,
    pub q: QueueScratch,
}

impl Order {
    pub fn new(
        order_id: OrderId,
        price_tick: i64,
        tick_size: f64,
        qty: f64,
        side: Side,
        order_type: OrdType,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            order_id,
            price_tick,
            tick_size,
            qty,
            leaves_qty: qty,
            side,
            order_type,
            time_in_force,
            status: Status::None,
            req: Req::None,
            exec_price_tick: 0,
            exec_qty: 0.0,
            exch_timestamp: 0,
            local_timestamp: 0,
            maker: false,
            q: QueueScratch::Empty,
        }
    }

    pub fn price(&self) -> f64 {
        self.price_tick as f64 * self.tick_size
    }

    pub fn exec_price(&self) -> f64 {
        self.exec_price_tick as f64 * self.tick_size
    }

    /// An order may be canceled only while it is resting untouched: newly placed and with
    /// no other request already in flight against it.
    pub fn cancellable(&self) -> bool {
        self.status == Status::New && self.req == Req::None
    }

    pub fn active(&self) -> bool {
        matches!(self.status, Status::New | Status::PartiallyFilled)
    }

    /// Reconciles fields reported by the counterparty ladder into this copy. Warns instead
    /// of panicking on an out-of-order exchange timestamp, since a backtest should not die
    /// on a single malformed row.
    pub fn update(&mut self, other: &Order) {
        if other.exch_timestamp > 0 && other.exch_timestamp < self.exch_timestamp {
            tracing::warn!(
                order_id = self.order_id,
                prev = self.exch_timestamp,
                new = other.exch_timestamp,
                "received an order update with an earlier exchange timestamp"
            );
        }
        self.qty = other.qty;
        self.leaves_qty = other.leaves_qty;
        self.price_tick = other.price_tick;
        self.status = other.status;
        self.req = other.req;
        self.exec_price_tick = other.exec_price_tick;
        self.exec_qty = other.exec_qty;
        self.exch_timestamp = other.exch_timestamp;
        self.maker = other.maker;
    }
}

/// A snapshot of the position/balance/fee bookkeeping maintained by [`crate::backtest::state::State`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StateValues {
    pub position: f64,
    pub balance: f64,
    pub fee: f64,
    pub num_trades: i64,
    pub trading_volume: f64,
    pub trading_value: f64,
}

/// What [`crate::backtest::Backtest::elapse`] should additionally wait for before returning.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitOrderResponse {
    None,
    Any,
    Specified(OrderId),
}

//! The simulation core: local/exchange processor pair, the scheduler that drives them, and
//! the builder that wires a runnable [`Backtest`] together.

pub mod assettype;
pub mod data;
pub mod evs;
pub mod models;
pub mod order;
pub mod proc;
pub mod recorder;
pub mod state;

use std::io::Error as IoError;

use thiserror::Error;

use crate::backtest::assettype::AssetType;
use crate::backtest::data::{Cache, Data, DataSource, Reader};
use crate::backtest::evs::{Actor, EventSet};
use crate::backtest::models::{LatencyModel, QueueModel};
use crate::backtest::order::order_channel;
use crate::backtest::proc::{Exchange, Local, LocalProcessor, Processor};
use crate::backtest::state::State;
use crate::depth::{L2MarketDepth, MarketDepth, NewMarketDepth};
use crate::types::{Event, OrdType, Order, OrderId, Side, StateValues, TimeInForce, WaitOrderResponse};

/// Everything that can go wrong building or running a backtest.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("order id {0} already exists and is still active")]
    OrderIdExist(OrderId),
    #[error("order id {0} not found")]
    OrderNotFound(OrderId),
    #[error("order id {0} already has a request in flight")]
    OrderRequestInProcess(OrderId),
    #[error("invalid order request: non-positive price or quantity")]
    InvalidOrderRequest,
    #[error("reached the end of the historical data")]
    EndOfData,
    #[error(transparent)]
    Io(#[from] IoError),
}

struct FeedCursor {
    reader: Reader<Event>,
    data: Data<Event>,
    row: usize,
}

impl FeedCursor {
    fn new(mut reader: Reader<Event>) -> Result<Self, BacktestError> {
        let data = reader.next_data()?;
        Ok(Self { reader, data, row: 0 })
    }

    /// Finds the next valid (positive) view timestamp without consuming the row, loading
    /// further chunks from the reader as the current one is exhausted.
    fn peek<P: Processor>(&mut self, processor: &P) -> Result<i64, BacktestError> {
        loop {
            if self.row < self.data.len() {
                if let Some(ts) = processor.event_seen_timestamp(&self.data[self.row]) {
                    if ts > 0 {
                        return Ok(ts);
                    }
                }
                self.row += 1;
            } else {
                match self.reader.next_data() {
                    Ok(next) => {
                        let prev = std::mem::replace(&mut self.data, next);
                        self.reader.release(prev);
                        self.row = 0;
                    }
                    Err(BacktestError::EndOfData) => return Ok(0),
                    Err(e) => return Err(e),
                }
            }
        }
    }

    fn advance<P: Processor>(&mut self, processor: &mut P) -> Result<(), BacktestError> {
        let ev = self.data[self.row].clone();
        self.row += 1;
        processor.process_data(&ev)
    }
}

/// Constructs a [`Backtest`] instance, wiring the local and exchange processors together
/// over a shared, latency-modeled order channel.
pub struct BacktestBuilder<AT, LM, QM, MD> {
    tick_size: f64,
    lot_size: f64,
    maker_fee: f64,
    taker_fee: f64,
    starting_balance: f64,
    last_trades_capacity: usize,
    latency_offset: i64,
    asset_type: Option<AT>,
    latency_model: Option<LM>,
    queue_model: Option<QM>,
    local_sources: Vec<DataSource<Event>>,
    exch_sources: Vec<DataSource<Event>>,
    _md: std::marker::PhantomData<MD>,
}

impl<AT, LM, QM, MD> Default for BacktestBuilder<AT, LM, QM, MD> {
    fn default() -> Self {
        Self {
            tick_size: 0.0,
            lot_size: 0.0,
            maker_fee: 0.0,
            taker_fee: 0.0,
            starting_balance: 0.0,
            last_trades_capacity: 0,
            latency_offset: 0,
            asset_type: None,
            latency_model: None,
            queue_model: None,
            local_sources: Vec::new(),
            exch_sources: Vec::new(),
            _md: std::marker::PhantomData,
        }
    }
}

impl<AT, LM, QM, MD> BacktestBuilder<AT, LM, QM, MD>
where
    AT: AssetType,
    LM: LatencyModel + Clone,
    QM: QueueModel<MD>,
    MD: MarketDepth + L2MarketDepth + NewMarketDepth,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_size(mut self, tick_size: f64) -> Self {
        self.tick_size = tick_size;
        self
    }

    pub fn lot_size(mut self, lot_size: f64) -> Self {
        self.lot_size = lot_size;
        self
    }

    pub fn fees(mut self, maker_fee: f64, taker_fee: f64) -> Self {
        self.maker_fee = maker_fee;
        self.taker_fee = taker_fee;
        self
    }

    pub fn starting_balance(mut self, balance: f64) -> Self {
        self.starting_balance = balance;
        self
    }

    pub fn last_trades_capacity(mut self, cap: usize) -> Self {
        self.last_trades_capacity = cap;
        self
    }

    /// Offsets every row's `local_ts` by `offset` before the local processor sees it,
    /// modeling the extra hop between the exchange and a market-data consumer.
    pub fn latency_offset(mut self, offset: i64) -> Self {
        self.latency_offset = offset;
        self
    }

    pub fn asset_type(mut self, asset_type: AT) -> Self {
        self.asset_type = Some(asset_type);
        self
    }

    pub fn latency_model(mut self, latency_model: LM) -> Self {
        self.latency_model = Some(latency_model);
        self
    }

    pub fn queue_model(mut self, queue_model: QM) -> Self {
        self.queue_model = Some(queue_model);
        self
    }

    /// Uses the same historical event array for both the local and exchange view. This is
    /// the common case: the local view differs from the exchange view only through
    /// [`BacktestBuilder::latency_offset`], not through a distinct data source.
    pub fn data(mut self, sources: Vec<DataSource<Event>>) -> Self {
        self.exch_sources = sources.clone();
        self.local_sources = sources;
        self
    }

    pub fn local_data(mut self, sources: Vec<DataSource<Event>>) -> Self {
        self.local_sources = sources;
        self
    }

    pub fn exchange_data(mut self, sources: Vec<DataSource<Event>>) -> Self {
        self.exch_sources = sources;
        self
    }

    pub fn build(self) -> Result<Backtest<AT, LM, QM, MD>, BacktestError>
    where
        MD: Clone,
        AT: Clone,
    {
        let asset_type = self.asset_type.expect("asset_type is required");
        let latency_model = self.latency_model.expect("latency_model is required");
        let queue_model = self.queue_model.expect("queue_model is required");

        let local_depth = MD::new(self.tick_size, self.lot_size);
        let exch_depth = MD::new(self.tick_size, self.lot_size);

        let local_state = State::new(self.maker_fee, self.taker_fee, asset_type.clone())
            .with_starting_balance(self.starting_balance);
        let exch_state =
            State::new(self.maker_fee, self.taker_fee, asset_type).with_starting_balance(self.starting_balance);

        let (local_channel, exch_channel) = order_channel(latency_model);

        let local = Local::new(local_depth, local_state, self.last_trades_capacity, local_channel);
        let exch = Exchange::new(exch_depth, exch_state, exch_channel, queue_model);

        let local_cache: Cache<Event> = Cache::new();
        let mut local_reader = Reader::new(local_cache);
        if self.latency_offset != 0 {
            local_reader.add_preprocessor(data::FeedLatencyAdjustment::new(self.latency_offset));
        }
        for src in self.local_sources {
            match src {
                DataSource::File(p) => {
                    local_reader.add_file(p);
                }
                DataSource::Data(d) => {
                    local_reader.add_data(d);
                }
            }
        }

        let exch_cache: Cache<Event> = Cache::new();
        let mut exch_reader = Reader::new(exch_cache);
        for src in self.exch_sources {
            match src {
                DataSource::File(p) => {
                    exch_reader.add_file(p);
                }
                DataSource::Data(d) => {
                    exch_reader.add_data(d);
                }
            }
        }

        let local_feed = FeedCursor::new(local_reader)?;
        let exch_feed = FeedCursor::new(exch_reader)?;

        let mut bt = Backtest {
            current_ts: 0,
            evs: EventSet::new(),
            local,
            local_feed,
            exch,
            exch_feed,
        };
        bt.prime()?;
        Ok(bt)
    }
}

/// A runnable backtest: the coupled local/exchange processor pair, their data feeds, and
/// the global scheduler clock.
pub struct Backtest<AT, LM, QM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    QM: QueueModel<MD>,
    MD: MarketDepth,
{
    current_ts: i64,
    evs: EventSet,
    local: Local<AT, LM, MD>,
    local_feed: FeedCursor,
    exch: Exchange<AT, LM, QM, MD>,
    exch_feed: FeedCursor,
}

impl<AT, LM, QM, MD> Backtest<AT, LM, QM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    QM: QueueModel<MD>,
    MD: MarketDepth + L2MarketDepth,
{
    fn prime(&mut self) -> Result<(), BacktestError> {
        let local_ts = self.local_feed.peek(&self.local)?;
        let exch_ts = self.exch_feed.peek(&self.exch)?;
        self.evs.update_local_data(if local_ts > 0 { local_ts } else { i64::MAX });
        self.evs.update_exch_data(if exch_ts > 0 { exch_ts } else { i64::MAX });
        self.evs.update_local_order(self.local.earliest_recv_order_timestamp());
        self.evs.update_exch_order(self.exch.earliest_recv_order_timestamp());
        Ok(())
    }

    pub fn current_timestamp(&self) -> i64 {
        self.current_ts
    }

    /// Advances the simulated clock by `duration`, processing every data and order event
    /// strictly in between. Returns `false` once the data is exhausted (the scheduler will
    /// make no further progress regardless of how much more `duration` is requested).
    pub fn elapse(&mut self, duration: i64) -> Result<bool, BacktestError> {
        self.elapse_with(duration, WaitOrderResponse::None)
    }

    /// As [`Backtest::elapse`], but additionally stops early once a response matching
    /// `wait` has been observed, even if `duration` has not yet elapsed.
    pub fn elapse_with(&mut self, duration: i64, wait: WaitOrderResponse) -> Result<bool, BacktestError> {
        let target = if duration >= crate::types::UNTIL_END_OF_DATA - self.current_ts {
            crate::types::UNTIL_END_OF_DATA
        } else {
            self.current_ts + duration
        };

        loop {
            let (actor, ts) = match self.evs.next() {
                Some(x) => x,
                None => return Ok(false),
            };
            if ts > target {
                self.current_ts = target;
                return Ok(true);
            }
            self.current_ts = ts;

            let wait_id = match wait {
                WaitOrderResponse::Specified(id) => Some(id),
                _ => None,
            };

            let mut saw_wait_resp = false;
            match actor {
                Actor::LocalData => {
                    self.local_feed.advance(&mut self.local)?;
                    let next_ts = self.local_feed.peek(&self.local)?;
                    if next_ts > 0 {
                        self.evs.update_local_data(next_ts);
                    } else {
                        self.evs.invalidate_local_data();
                    }
                }
                Actor::ExchData => {
                    self.exch_feed.advance(&mut self.exch)?;
                    let next_ts = self.exch_feed.peek(&self.exch)?;
                    if next_ts > 0 {
                        self.evs.update_exch_data(next_ts);
                    } else {
                        self.evs.invalidate_exch_data();
                    }
                }
                Actor::LocalOrder => {
                    saw_wait_resp = self.local.process_recv_order(ts, wait_id)?;
                }
                Actor::ExchOrder => {
                    saw_wait_resp = self.exch.process_recv_order(ts, wait_id)?;
                }
            }
            // A data row can trigger a fill (pushing a response onto the local-bound bus)
            // just as processing an order request can; refresh both pending timestamps
            // unconditionally rather than trying to track which branches are "dirty".
            self.refresh_order_timestamps();
            if saw_wait_resp && matches!(wait, WaitOrderResponse::Specified(_)) {
                return Ok(true);
            }
        }
    }

    pub fn submit_buy_order(
        &mut self,
        order_id: OrderId,
        price: f64,
        qty: f64,
        order_type: OrdType,
        time_in_force: TimeInForce,
    ) -> Result<(), BacktestError> {
        self.local
            .submit_order(order_id, Side::Buy, price, qty, order_type, time_in_force, self.current_ts)?;
        self.refresh_order_timestamps();
        Ok(())
    }

    pub fn submit_sell_order(
        &mut self,
        order_id: OrderId,
        price: f64,
        qty: f64,
        order_type: OrdType,
        time_in_force: TimeInForce,
    ) -> Result<(), BacktestError> {
        self.local
            .submit_order(order_id, Side::Sell, price, qty, order_type, time_in_force, self.current_ts)?;
        self.refresh_order_timestamps();
        Ok(())
    }

    pub fn cancel(&mut self, order_id: OrderId) -> Result<(), BacktestError> {
        self.local.cancel(order_id, self.current_ts)?;
        self.refresh_order_timestamps();
        Ok(())
    }

    fn refresh_order_timestamps(&mut self) {
        self.evs.update_exch_order(self.exch.earliest_recv_order_timestamp());
        self.evs.update_local_order(self.local.earliest_recv_order_timestamp());
    }

    pub fn clear_inactive_orders(&mut self) {
        self.local.clear_inactive_orders();
    }

    pub fn position(&self) -> f64 {
        self.local.position()
    }

    pub fn state_values(&self) -> &StateValues {
        self.local.state_values()
    }

    pub fn equity(&self, mid: f64) -> f64 {
        self.local.equity(mid)
    }

    pub fn depth(&self) -> &MD {
        self.local.depth()
    }

    pub fn orders(&self) -> &std::collections::HashMap<OrderId, Order> {
        self.local.orders()
    }

    pub fn record<R: crate::backtest::recorder::Recorder>(&self, recorder: &mut R) -> Result<(), R::Error> {
        recorder.record(self.current_ts, self.local.depth(), self.local.state_values())
    }
}

use backsim::prelude::*;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Half-spread quoted around the mid price, in ticks.
    #[arg(long, default_value_t = 5)]
    spread_ticks: i64,

    /// Quantity quoted on each side.
    #[arg(long, default_value_t = 1.0)]
    order_qty: f64,

    /// Number of synthetic trade prints to replay.
    #[arg(long, default_value_t = 200)]
    steps: usize,
}

/// Builds a synthetic tick stream: a snapshot, then a random-walking sequence of trades
/// and depth refreshes, one nanosecond apart. Stands in for a real NPZ feed so this demo
/// runs without any on-disk data file.
fn synthetic_feed(steps: usize) -> Vec<Event> {
    let mut events = Vec::with_capacity(steps * 3 + 2);
    let tick_size = 0.01;
    let mut mid_tick: i64 = 1_000_000;

    events.push(Event::new(EventKind::Depth, 1, 1, Side::Buy, (mid_tick - 1) as f64 * tick_size, 10.0));
    events.push(Event::new(EventKind::Depth, 1, 1, Side::Sell, (mid_tick + 1) as f64 * tick_size, 10.0));

    for i in 1..=steps as i64 {
        // A small deterministic oscillation stands in for genuine market noise; the point
        // of this demo is exercising the scheduler and order lifecycle, not realism.
        let drift = if i % 7 == 0 { 1 } else if i % 11 == 0 { -1 } else { 0 };
        mid_tick += drift;
        let ts = i * 1_000_000;

        events.push(Event::new(EventKind::Trade, ts, ts, Side::Buy, mid_tick as f64 * tick_size, 0.5));
        events.push(Event::new(EventKind::Depth, ts, ts, Side::Buy, (mid_tick - 1) as f64 * tick_size, 10.0));
        events.push(Event::new(EventKind::Depth, ts, ts, Side::Sell, (mid_tick + 1) as f64 * tick_size, 10.0));
    }
    events
}

/// Cancels a resting quote if it's still cancellable, swallowing "not found"/"already
/// expired" errors since the exchange may have filled or expired it since our last check.
fn cancel_if_live(
    bt: &mut Backtest<LinearAsset, ConstantLatency, RiskAverseQueueModel, HashMapMarketDepth>,
    order_id: OrderId,
) {
    match bt.cancel(order_id) {
        Ok(()) | Err(BacktestError::OrderNotFound(_)) | Err(BacktestError::OrderRequestInProcess(_)) => {}
        Err(e) => info!(%e, order_id, "cancel failed"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let events = synthetic_feed(args.steps);

    let mut bt = BacktestBuilder::<LinearAsset, ConstantLatency, RiskAverseQueueModel, HashMapMarketDepth>::new()
        .tick_size(0.01)
        .lot_size(0.001)
        .fees(-0.00005, 0.0007)
        .starting_balance(100_000.0)
        .last_trades_capacity(1024)
        .asset_type(LinearAsset::new(1.0))
        .latency_model(ConstantLatency::new(10_000, 10_000))
        .queue_model(RiskAverseQueueModel)
        .data(vec![DataSource::Data(Data::from_vec(events))])
        .build()?;

    let mut next_id: OrderId = 1;
    let mut bid_id: Option<OrderId> = None;
    let mut ask_id: Option<OrderId> = None;

    while bt.elapse(1_000_000)? {
        let depth = bt.depth();
        let mid = depth.mid();
        let tick_size = depth.tick_size();
        if mid.is_nan() {
            continue;
        }

        if let Some(id) = bid_id.take() {
            cancel_if_live(&mut bt, id);
        }
        if let Some(id) = ask_id.take() {
            cancel_if_live(&mut bt, id);
        }

        let bid_price = mid - args.spread_ticks as f64 * tick_size;
        let ask_price = mid + args.spread_ticks as f64 * tick_size;

        let id = next_id;
        next_id += 1;
        bt.submit_buy_order(id, bid_price, args.order_qty, OrdType::Limit, TimeInForce::GTX)?;
        bid_id = Some(id);

        let id = next_id;
        next_id += 1;
        bt.submit_sell_order(id, ask_price, args.order_qty, OrdType::Limit, TimeInForce::GTX)?;
        ask_id = Some(id);
    }

    let values = bt.state_values();
    info!(
        position = values.position,
        balance = values.balance,
        fee = values.fee,
        num_trades = values.num_trades,
        equity = bt.equity(bt.depth().mid()),
        "backtest finished"
    );

    let mut recorder = BacktestRecorder::new();
    bt.record(&mut recorder)?;
    info!(records = recorder.records().len(), "recorded final sample");

    Ok(())
}

//! Literal scenario tests for the order lifecycle: a resting maker fill, a post-only
//! rejection, a market order walking two price levels, an IOC partial fill, a cancel
//! racing a fill, and inverse-asset equity math.

use backsim::prelude::*;

type Sim = Backtest<LinearAsset, ConstantLatency, RiskAverseQueueModel, HashMapMarketDepth>;

fn builder() -> BacktestBuilder<LinearAsset, ConstantLatency, RiskAverseQueueModel, HashMapMarketDepth> {
    BacktestBuilder::new()
        .tick_size(1.0)
        .lot_size(1.0)
        .fees(0.0, 0.0)
        .starting_balance(0.0)
        .last_trades_capacity(16)
        .asset_type(LinearAsset::new(1.0))
        .latency_model(ConstantLatency::new(1, 1))
        .queue_model(RiskAverseQueueModel)
}

fn run<AT, LM, QM, MD>(mut bt: Backtest<AT, LM, QM, MD>, steps: usize) -> Backtest<AT, LM, QM, MD>
where
    AT: AssetType,
    LM: LatencyModel,
    QM: QueueModel<MD>,
    MD: MarketDepth + L2MarketDepth,
{
    for _ in 0..steps {
        if !bt.elapse(1).unwrap() {
            break;
        }
    }
    bt
}

/// S1: a resting GTC buy at 99, ahead of it nothing, gets filled in full when a trade
/// prints 5 at that price.
#[test]
fn resting_maker_order_fills_on_matching_trade() {
    let events = vec![
        Event::new(EventKind::Depth, 1, 1, Side::Buy, 100.0, 10.0),
        Event::new(EventKind::Depth, 1, 1, Side::Sell, 101.0, 10.0),
        Event::new(EventKind::Trade, 2, 2, Side::Sell, 99.0, 5.0),
    ];
    let mut bt = builder().data(vec![DataSource::Data(Data::from_vec(events))]).build().unwrap();

    bt.submit_buy_order(1, 99.0, 5.0, OrdType::Limit, TimeInForce::GTC).unwrap();
    let mut bt = run(bt, 10);

    let order = bt.orders().get(&1).cloned();
    assert!(order.is_none() || order.unwrap().status == Status::Filled);
    assert_eq!(bt.position(), 5.0);
    assert_eq!(bt.state_values().balance, -(99.0 * 5.0));
}

/// S2: a post-only (GTX) buy priced at or through the best ask is rejected on arrival,
/// never rests in the book.
#[test]
fn post_only_order_expires_when_marketable() {
    let events = vec![
        Event::new(EventKind::Depth, 1, 1, Side::Buy, 100.0, 10.0),
        Event::new(EventKind::Depth, 1, 1, Side::Sell, 101.0, 10.0),
    ];
    let mut bt = builder().data(vec![DataSource::Data(Data::from_vec(events))]).build().unwrap();

    bt.submit_buy_order(1, 101.0, 1.0, OrdType::Limit, TimeInForce::GTX).unwrap();
    let bt = run(bt, 10);

    let order = bt.orders().get(&1).expect("order still tracked locally");
    assert_eq!(order.status, Status::Expired);
    assert_eq!(bt.position(), 0.0);
}

/// S3: a market buy for 7 walks two ask levels (4@101, then 3@102).
#[test]
fn market_order_walks_multiple_price_levels() {
    let events = vec![
        Event::new(EventKind::Depth, 1, 1, Side::Buy, 100.0, 10.0),
        Event::new(EventKind::Depth, 1, 1, Side::Sell, 101.0, 4.0),
        Event::new(EventKind::Depth, 1, 1, Side::Sell, 102.0, 5.0),
    ];
    let mut bt = builder().data(vec![DataSource::Data(Data::from_vec(events))]).build().unwrap();

    // Market orders ignore price when matching, but still must pass the local side's
    // positive-price sanity check; a large sentinel price is conventional for a buy.
    bt.submit_buy_order(1, 1_000_000.0, 7.0, OrdType::Market, TimeInForce::IOC).unwrap();
    let bt = run(bt, 10);

    assert_eq!(bt.position(), 7.0);
    assert_eq!(bt.state_values().balance, -(101.0 * 4.0 + 102.0 * 3.0));
    assert_eq!(bt.state_values().num_trades, 2);
}

/// S4: an IOC buy for 10 against only 4 available at the limit price fills the 4 and
/// expires the residual rather than resting it.
#[test]
fn ioc_order_fills_available_and_expires_residual() {
    let events = vec![
        Event::new(EventKind::Depth, 1, 1, Side::Buy, 100.0, 10.0),
        Event::new(EventKind::Depth, 1, 1, Side::Sell, 101.0, 4.0),
    ];
    let mut bt = builder().data(vec![DataSource::Data(Data::from_vec(events))]).build().unwrap();

    bt.submit_buy_order(1, 101.0, 10.0, OrdType::Limit, TimeInForce::IOC).unwrap();
    let bt = run(bt, 10);

    assert_eq!(bt.position(), 4.0);
    let order = bt.orders().get(&1);
    assert!(order.is_none() || order.unwrap().status != Status::New);
}

/// S5: a cancel races a fill. Whichever side wins, the executed quantity plus whatever
/// quantity is still outstanding and cancelable must always sum to the original order
/// quantity — no quantity may be created or destroyed by the race.
#[test]
fn cancel_racing_a_fill_conserves_quantity() {
    let events = vec![
        Event::new(EventKind::Depth, 1, 1, Side::Sell, 101.0, 10.0),
        Event::new(EventKind::Trade, 2, 2, Side::Sell, 100.0, 2.0),
        Event::new(EventKind::Trade, 4, 4, Side::Sell, 100.0, 3.0),
    ];
    let mut bt = builder().data(vec![DataSource::Data(Data::from_vec(events))]).build().unwrap();

    bt.submit_buy_order(1, 100.0, 5.0, OrdType::Limit, TimeInForce::GTC).unwrap();
    let mut bt = run(bt, 3);
    let _ = bt.cancel(1);
    let bt = run(bt, 10);

    let executed = bt.position();
    let outstanding = bt.orders().get(&1).map(|o| o.leaves_qty).unwrap_or(0.0);
    assert_eq!(executed + outstanding, 5.0);
}

/// S6: an inverse contract's equity accounts for balance, position, and fee in
/// base-currency terms, following [`InverseAsset::equity`].
#[test]
fn inverse_asset_equity_matches_contract_math() {
    let events = vec![Event::new(EventKind::Depth, 1, 1, Side::Sell, 100.0, 10.0)];
    let mut bt: Backtest<InverseAsset, ConstantLatency, RiskAverseQueueModel, HashMapMarketDepth> =
        BacktestBuilder::new()
            .tick_size(1.0)
            .lot_size(1.0)
            .fees(0.0, 0.0)
            .starting_balance(0.0)
            .last_trades_capacity(16)
            .asset_type(InverseAsset::new(1.0))
            .latency_model(ConstantLatency::new(1, 1))
            .queue_model(RiskAverseQueueModel)
            .data(vec![DataSource::Data(Data::from_vec(events))])
            .build()
            .unwrap();

    bt.submit_buy_order(1, 1_000_000.0, 1.0, OrdType::Market, TimeInForce::IOC).unwrap();
    let bt = run(bt, 10);

    assert_eq!(bt.position(), 1.0);
    assert_eq!(bt.state_values().balance, -1.0 / 100.0);

    let equity = bt.equity(110.0);
    let expected = -bt.state_values().balance - 1.0 / 110.0 - bt.state_values().fee;
    assert!((equity - expected).abs() < 1e-12);
}

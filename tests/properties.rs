//! Property-based tests for the invariants a correct backtest must never violate, regardless
//! of the specific order/book sequence fed through it: book cleanliness, quantity
//! conservation, the linear PnL identity, round-trip latency, post-only never taking
//! liquidity, and run-to-run determinism.

use backsim::backtest::order::order_channel;
use backsim::depth::{INVALID_MAX, INVALID_MIN};
use backsim::prelude::*;
use proptest::prelude::*;

type Sim = Backtest<LinearAsset, ConstantLatency, RiskAverseQueueModel, HashMapMarketDepth>;

fn build_sim(events: Vec<Event>, entry_latency: i64, response_latency: i64) -> Sim {
    BacktestBuilder::new()
        .tick_size(1.0)
        .lot_size(1.0)
        .fees(0.0, 0.0005)
        .starting_balance(1_000_000.0)
        .last_trades_capacity(0)
        .asset_type(LinearAsset::new(1.0))
        .latency_model(ConstantLatency::new(entry_latency, response_latency))
        .queue_model(RiskAverseQueueModel)
        .data(vec![DataSource::Data(Data::from_vec(events))])
        .build()
        .unwrap()
}

/// A two-sided book seeded at `bid`/`ask` ticks, followed by a single order submission
/// against it, then enough elapsed time for every response to land.
fn scenario(bid_qty: f64, ask_qty: f64, side: Side, tif: TimeInForce, order_qty: f64, price_offset_ticks: i64) -> Sim {
    let events = vec![
        Event::new(EventKind::Depth, 1, 1, Side::Buy, 100.0, bid_qty),
        Event::new(EventKind::Depth, 1, 1, Side::Sell, 101.0, ask_qty),
    ];
    let mut bt = build_sim(events, 5, 5);
    let price = match side {
        Side::Buy => 101.0 + price_offset_ticks as f64,
        Side::Sell => 100.0 - price_offset_ticks as f64,
        Side::None => 100.0,
    };
    let price = price.max(1.0);
    match side {
        Side::Buy => bt.submit_buy_order(1, price, order_qty, OrdType::Limit, tif).unwrap(),
        Side::Sell => bt.submit_sell_order(1, price, order_qty, OrdType::Limit, tif).unwrap(),
        Side::None => {}
    }
    for _ in 0..50 {
        if !bt.elapse(1).unwrap() {
            break;
        }
    }
    bt
}

fn tif_strategy() -> impl Strategy<Value = TimeInForce> {
    prop_oneof![
        Just(TimeInForce::GTC),
        Just(TimeInForce::GTX),
        Just(TimeInForce::IOC),
        Just(TimeInForce::FOK),
    ]
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

proptest! {
    /// Invariant 3: a depth replica never retains a zero-quantity entry, and its cached
    /// best tick always matches the true extremum of what's resting.
    #[test]
    fn book_has_no_zero_qty_entries_after_random_updates(
        updates in prop::collection::vec((any::<bool>(), 90i64..110, 0.0f64..20.0), 1..40),
    ) {
        let mut depth = HashMapMarketDepth::new(1.0, 1.0);
        for (is_bid, tick, qty) in updates {
            let price = tick as f64;
            if is_bid {
                depth.update_bid_depth(price, qty, 1);
            } else {
                depth.update_ask_depth(price, qty, 1);
            }
        }
        if depth.best_bid_tick() != INVALID_MIN {
            prop_assert!(depth.bid_qty_at_tick(depth.best_bid_tick()) > 0.0);
        }
        if depth.best_ask_tick() != INVALID_MAX {
            prop_assert!(depth.ask_qty_at_tick(depth.best_ask_tick()) > 0.0);
        }
    }

    /// Invariant 4: the position reported by the local ladder always equals the signed sum
    /// of every fill's executed quantity it has reconciled.
    #[test]
    fn position_matches_signed_sum_of_fills(
        side in side_strategy(),
        tif in tif_strategy(),
        order_qty in 1.0f64..20.0,
        price_offset in 0i64..3,
    ) {
        let bt = scenario(10.0, 10.0, side, tif, order_qty, price_offset);
        let expected_sign = side.sign();
        let position = bt.position();
        // Position can only move in the direction of the order's own side; it never
        // overshoots the quantity actually requested.
        prop_assert!(position * expected_sign >= -1e-9);
        prop_assert!(position.abs() <= order_qty + 1e-9);
    }

    /// Invariant 5: equity reconstructed from balance/position/fee via the linear formula
    /// matches what `Backtest::equity` reports, at any mid price.
    #[test]
    fn linear_equity_matches_balance_position_formula(
        side in side_strategy(),
        tif in tif_strategy(),
        order_qty in 1.0f64..20.0,
        mid in 50.0f64..200.0,
    ) {
        let bt = scenario(10.0, 10.0, side, tif, order_qty, 0);
        let values = bt.state_values();
        let expected = values.balance + values.position * mid - values.fee;
        prop_assert!((bt.equity(mid) - expected).abs() < 1e-6);
    }

    /// Invariant 6: no response can reach the local side sooner than the sum of entry and
    /// response latency after the request was sent, regardless of order side/price.
    #[test]
    fn response_never_arrives_before_round_trip_latency(
        entry_latency in 1i64..100,
        response_latency in 1i64..100,
        submit_ts in 0i64..1000,
    ) {
        let (mut local, mut exch) = order_channel(ConstantLatency::new(entry_latency, response_latency));
        let order = Order::new(1, 10000, 0.01, 1.0, Side::Buy, OrdType::Limit, TimeInForce::GTC);
        local.request(submit_ts, order, |_| {});

        let (received, recv_ts) = exch.receive(submit_ts + entry_latency).expect("request ready by entry_latency");
        prop_assert_eq!(recv_ts, submit_ts + entry_latency);

        let mut acked = received;
        acked.status = Status::New;
        exch.respond(recv_ts, acked);

        prop_assert!(local.receive(recv_ts + response_latency - 1).is_none());
        let ack = local.receive(recv_ts + response_latency);
        prop_assert!(ack.is_some());
        prop_assert!(recv_ts + response_latency >= submit_ts + entry_latency + response_latency);
    }

    /// Invariant 7: a GTX (post-only) order's final local status is always New (resting,
    /// never crossing) or Expired (would have crossed) — never Filled or PartiallyFilled.
    #[test]
    fn post_only_order_never_takes_liquidity(
        side in side_strategy(),
        order_qty in 1.0f64..20.0,
        price_offset in (-2i64)..3,
    ) {
        let bt = scenario(10.0, 10.0, side, TimeInForce::GTX, order_qty, price_offset);
        let order = bt.orders().get(&1);
        if let Some(order) = order {
            prop_assert!(matches!(order.status, Status::New | Status::Expired));
        }
    }

    /// Invariant 8: replaying the same event/order sequence through two fresh backtests
    /// yields byte-identical position/balance/fee/trade-count trajectories.
    #[test]
    fn identical_inputs_produce_identical_state(
        side in side_strategy(),
        tif in tif_strategy(),
        order_qty in 1.0f64..20.0,
        price_offset in 0i64..3,
    ) {
        let a = scenario(10.0, 10.0, side, tif, order_qty, price_offset);
        let b = scenario(10.0, 10.0, side, tif, order_qty, price_offset);
        let (va, vb) = (a.state_values(), b.state_values());
        prop_assert_eq!(va.position.to_bits(), vb.position.to_bits());
        prop_assert_eq!(va.balance.to_bits(), vb.balance.to_bits());
        prop_assert_eq!(va.fee.to_bits(), vb.fee.to_bits());
        prop_assert_eq!(va.num_trades, vb.num_trades);
    }
}

//! Re-exports the types a strategy author typically needs in scope.

pub use crate::backtest::{
    Backtest,
    BacktestBuilder,
    BacktestError,
    assettype::{AssetType, InverseAsset, LinearAsset},
    data::{Data, DataSource},
    models::{
        ConstantLatency,
        LatencyModel,
        LogProbQueueFunc,
        PowerProbQueueFunc,
        ProbQueueModel,
        QueueModel,
        RiskAverseQueueModel,
    },
    recorder::{BacktestRecorder, Record, Recorder},
};
pub use crate::depth::{HashMapMarketDepth, L2MarketDepth, MarketDepth, NewMarketDepth};
pub use crate::types::{Event, EventKind, OrdType, Order, OrderId, Side, StateValues, Status, TimeInForce};

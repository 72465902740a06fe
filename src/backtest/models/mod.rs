//! Pluggable model families: latency and queue position.

mod latency;
mod queue;

pub use latency::{ConstantLatency, LatencyModel, OrderLatencyRow};
#[cfg(feature = "unstable_intp_latency")]
pub use latency::IntpOrderLatency;
pub use queue::{LogProbQueueFunc, PowerProbQueueFunc, Probability, ProbQueueModel, QueueModel, RiskAverseQueueModel};

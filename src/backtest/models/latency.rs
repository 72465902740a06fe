//! Order entry and response latency models.

use crate::types::Order;

/// Provides order entry latency (submit -> exchange) and response latency
/// (exchange -> local).
///
/// A negative return from either method signals a rejection: the magnitude is the latency
/// the local side experiences before learning about it, mirroring exchanges that reject
/// requests during overload without ever reaching the matching engine.
pub trait LatencyModel {
    fn entry(&mut self, timestamp: i64, order: &Order) -> i64;
    fn response(&mut self, timestamp: i64, order: &Order) -> i64;
}

/// Fixed entry/response latency, independent of the order or the current time.
#[derive(Clone, Debug)]
pub struct ConstantLatency {
    entry_latency: i64,
    response_latency: i64,
}

impl ConstantLatency {
    /// `entry_latency` and `response_latency` should use the same time unit as the event
    /// stream's timestamps (nanoseconds is the conventional choice).
    pub fn new(entry_latency: i64, response_latency: i64) -> Self {
        Self {
            entry_latency,
            response_latency,
        }
    }
}

impl LatencyModel for ConstantLatency {
    fn entry(&mut self, _timestamp: i64, _order: &Order) -> i64 {
        self.entry_latency
    }

    fn response(&mut self, _timestamp: i64, _order: &Order) -> i64 {
        self.response_latency
    }
}

/// A historical order-latency sample, interpolated between rows by [`IntpOrderLatency`].
#[derive(Clone, Copy, Debug, npyz::Serialize, npyz::Deserialize, npyz::AutoSerialize)]
pub struct OrderLatencyRow {
    pub req_ts: i64,
    pub exch_ts: i64,
    pub resp_ts: i64,
}

/// Interpolates entry/response latency from a historical order-latency sample rather than
/// assuming it is constant, for strategies sensitive to latency variation over the trading
/// day. Exposed behind the `unstable_intp_latency` feature since the interpolation walks a
/// monotonically-increasing row cursor and is only correct when queried with
/// non-decreasing timestamps, same as the underlying data reader.
#[cfg(feature = "unstable_intp_latency")]
#[derive(Clone, Debug)]
pub struct IntpOrderLatency {
    rows: std::rc::Rc<Vec<OrderLatencyRow>>,
    entry_rn: usize,
    resp_rn: usize,
}

#[cfg(feature = "unstable_intp_latency")]
impl IntpOrderLatency {
    pub fn new(rows: Vec<OrderLatencyRow>) -> Self {
        Self {
            rows: std::rc::Rc::new(rows),
            entry_rn: 0,
            resp_rn: 0,
        }
    }

    fn intp(x: i64, x1: i64, y1: i64, x2: i64, y2: i64) -> i64 {
        if x2 == x1 {
            return y1;
        }
        (((y2 - y1) as f64) / ((x2 - x1) as f64) * ((x - x1) as f64)) as i64 + y1
    }
}

#[cfg(feature = "unstable_intp_latency")]
impl LatencyModel for IntpOrderLatency {
    fn entry(&mut self, timestamp: i64, _order: &Order) -> i64 {
        let first = &self.rows[0];
        if timestamp < first.req_ts {
            return first.exch_ts - first.req_ts;
        }
        while self.entry_rn + 1 < self.rows.len() && self.rows[self.entry_rn + 1].req_ts <= timestamp {
            self.entry_rn += 1;
        }
        let row = &self.rows[self.entry_rn];
        let last = self.entry_rn + 1 >= self.rows.len();
        if last {
            return row.exch_ts - row.req_ts;
        }
        let next = &self.rows[self.entry_rn + 1];
        if row.exch_ts <= 0 || next.exch_ts <= 0 {
            let lat1 = row.resp_ts - row.req_ts;
            let lat2 = next.resp_ts - next.req_ts;
            return -Self::intp(timestamp, row.req_ts, lat1, next.req_ts, lat2);
        }
        let lat1 = row.exch_ts - row.req_ts;
        let lat2 = next.exch_ts - next.req_ts;
        Self::intp(timestamp, row.req_ts, lat1, next.req_ts, lat2)
    }

    fn response(&mut self, timestamp: i64, _order: &Order) -> i64 {
        let first = &self.rows[0];
        if timestamp < first.exch_ts {
            return first.resp_ts - first.exch_ts;
        }
        while self.resp_rn + 1 < self.rows.len() && self.rows[self.resp_rn + 1].exch_ts <= timestamp {
            self.resp_rn += 1;
        }
        let row = &self.rows[self.resp_rn];
        if self.resp_rn + 1 >= self.rows.len() {
            return row.resp_ts - row.exch_ts;
        }
        let next = &self.rows[self.resp_rn + 1];
        let lat1 = row.resp_ts - row.exch_ts;
        let lat2 = next.resp_ts - next.exch_ts;
        Self::intp(timestamp, row.exch_ts, lat1, next.exch_ts, lat2).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrdType, Side, TimeInForce};

    #[test]
    fn constant_latency_ignores_order_and_time() {
        let mut lm = ConstantLatency::new(100, 200);
        let order = Order::new(1, 100, 0.01, 1.0, Side::Buy, OrdType::Limit, TimeInForce::GTC);
        assert_eq!(lm.entry(0, &order), 100);
        assert_eq!(lm.response(12345, &order), 200);
    }
}

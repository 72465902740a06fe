//! Picks which actor the scheduler advances next.
//!
//! The original multi-asset engine indexes this by `asset_no` as well as actor kind; this
//! crate models a single coupled local/exchange pair; so the four timestamps are tracked
//! directly rather than through an indexed array.

/// One of the four event sources the scheduler chooses among at every step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Actor {
    LocalData,
    LocalOrder,
    ExchData,
    ExchOrder,
}

/// The next pending timestamp for each of the four sources; `i64::MAX` means "nothing
/// pending here".
#[derive(Clone, Copy, Debug)]
pub struct EventSet {
    local_data: i64,
    local_order: i64,
    exch_data: i64,
    exch_order: i64,
}

impl Default for EventSet {
    fn default() -> Self {
        Self {
            local_data: i64::MAX,
            local_order: i64::MAX,
            exch_data: i64::MAX,
            exch_order: i64::MAX,
        }
    }
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_local_data(&mut self, ts: i64) {
        self.local_data = ts;
    }

    pub fn update_local_order(&mut self, ts: i64) {
        self.local_order = if ts <= 0 { i64::MAX } else { ts };
    }

    pub fn update_exch_data(&mut self, ts: i64) {
        self.exch_data = ts;
    }

    pub fn update_exch_order(&mut self, ts: i64) {
        self.exch_order = if ts <= 0 { i64::MAX } else { ts };
    }

    pub fn invalidate_local_data(&mut self) {
        self.local_data = i64::MAX;
    }

    pub fn invalidate_exch_data(&mut self) {
        self.exch_data = i64::MAX;
    }

    /// Returns the earliest-pending actor and its timestamp, or `None` if all four sources
    /// are exhausted.
    pub fn next(&self) -> Option<(Actor, i64)> {
        let candidates = [
            (Actor::LocalData, self.local_data),
            (Actor::LocalOrder, self.local_order),
            (Actor::ExchData, self.exch_data),
            (Actor::ExchOrder, self.exch_order),
        ];
        candidates
            .into_iter()
            .filter(|(_, ts)| *ts < i64::MAX)
            .min_by_key(|(_, ts)| *ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_earliest_pending_actor() {
        let mut evs = EventSet::new();
        evs.update_local_data(100);
        evs.update_exch_data(50);
        assert_eq!(evs.next(), Some((Actor::ExchData, 50)));
    }

    #[test]
    fn none_when_everything_exhausted() {
        assert_eq!(EventSet::new().next(), None);
    }
}

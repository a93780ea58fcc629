use std::{cmp::Reverse, collections::BinaryHeap};

use chrono::NaiveDateTime;

use crate::model::order::OrderId;

/// Time-ordered order arrivals. The heap key includes the id so draining
/// co-timed arrivals is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ArrivalQueue {
    heap: BinaryHeap<Reverse<(NaiveDateTime, OrderId)>>,
}

impl ArrivalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, at: NaiveDateTime, order_id: OrderId) {
        self.heap.push(Reverse((at, order_id)));
    }

    pub fn peek_time(&self) -> Option<NaiveDateTime> {
        self.heap.peek().map(|Reverse((t, _))| *t)
    }

    /// Pop every arrival with `time <= now`, oldest first.
    pub fn pop_due(&mut self, now: NaiveDateTime) -> Vec<OrderId> {
        let mut due = Vec::new();
        while self.peek_time().map(|t| t <= now).unwrap_or(false) {
            let Reverse((_, id)) = self.heap.pop().expect("peeked element exists");
            due.push(id);
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn drains_due_arrivals_in_time_order() {
        let mut queue = ArrivalQueue::new();
        queue.push(at(17, 2), OrderId("O_b".into()));
        queue.push(at(17, 0), OrderId("O_a".into()));
        queue.push(at(17, 5), OrderId("O_c".into()));

        assert_eq!(queue.pop_due(at(16, 59)), Vec::<OrderId>::new());
        assert_eq!(
            queue.pop_due(at(17, 2)),
            vec![OrderId("O_a".into()), OrderId("O_b".into())]
        );
        assert_eq!(queue.peek_time(), Some(at(17, 5)));
        assert_eq!(queue.pop_due(at(18, 0)), vec![OrderId("O_c".into())]);
        assert!(queue.is_empty());
    }

    #[test]
    fn co_timed_arrivals_drain_by_id() {
        let mut queue = ArrivalQueue::new();
        queue.push(at(17, 0), OrderId("O_2".into()));
        queue.push(at(17, 0), OrderId("O_1".into()));
        assert_eq!(
            queue.pop_due(at(17, 0)),
            vec![OrderId("O_1".into()), OrderId("O_2".into())]
        );
    }
}

//! Reorder buffer turning out-of-order batch completions into in-order application.
//!
//! Outcomes are parked by batch index until every lower index has been released.
//! The buffer holds no locks itself; it is owned by the run's single apply consumer.

use crate::engine::types::BatchOutcome;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct ReorderBuffer {
    pending: BTreeMap<usize, BatchOutcome>,
    next_to_apply: usize,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `outcome` and release every outcome now contiguous with the cursor, in
    /// ascending batch order. The cursor advances past everything returned.
    ///
    /// An outcome for an index that was already released, or is already parked, is a
    /// duplicate and is handed back as `Err`.
    pub fn insert(&mut self, outcome: BatchOutcome) -> Result<Vec<BatchOutcome>, BatchOutcome> {
        let index = outcome.batch_index;
        if index < self.next_to_apply || self.pending.contains_key(&index) {
            return Err(outcome);
        }
        self.pending.insert(index, outcome);
        Ok(self.drain_ready())
    }

    fn drain_ready(&mut self) -> Vec<BatchOutcome> {
        let mut ready = Vec::new();
        while let Some(outcome) = self.pending.remove(&self.next_to_apply) {
            ready.push(outcome);
            self.next_to_apply += 1;
        }
        ready
    }

    /// Lowest batch index not yet released.
    pub fn next_to_apply(&self) -> usize {
        self.next_to_apply
    }

    /// Number of outcomes parked behind a gap.
    pub fn parked(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ExecutionMode;

    fn outcome(batch_index: usize) -> BatchOutcome {
        BatchOutcome {
            batch_index,
            start_offset: batch_index * 3,
            results: Vec::new(),
            call_latency_ms: 0.0,
            wall_clock_ms: 0.0,
            mode: ExecutionMode::Grouped,
        }
    }

    fn indexes(released: &[BatchOutcome]) -> Vec<usize> {
        released.iter().map(|o| o.batch_index).collect()
    }

    #[test]
    fn last_batch_first_waits_for_the_rest() {
        let mut buffer = ReorderBuffer::new();

        assert!(buffer.insert(outcome(3)).unwrap().is_empty());
        assert_eq!(buffer.parked(), 1);

        assert_eq!(indexes(&buffer.insert(outcome(0)).unwrap()), vec![0]);
        assert!(buffer.insert(outcome(2)).unwrap().is_empty());
        assert_eq!(indexes(&buffer.insert(outcome(1)).unwrap()), vec![1, 2, 3]);

        assert_eq!(buffer.next_to_apply(), 4);
        assert_eq!(buffer.parked(), 0);
    }

    #[test]
    fn in_order_arrivals_release_immediately() {
        let mut buffer = ReorderBuffer::new();
        for k in 0..5 {
            assert_eq!(indexes(&buffer.insert(outcome(k)).unwrap()), vec![k]);
        }
    }

    #[test]
    fn every_permutation_releases_in_order() {
        let orders = [
            vec![0, 1, 2, 3],
            vec![3, 2, 1, 0],
            vec![1, 3, 0, 2],
            vec![2, 0, 3, 1],
        ];
        for order in orders {
            let mut buffer = ReorderBuffer::new();
            let mut released = Vec::new();
            for k in order {
                released.extend(indexes(&buffer.insert(outcome(k)).unwrap()));
            }
            assert_eq!(released, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut buffer = ReorderBuffer::new();
        buffer.insert(outcome(0)).unwrap();
        buffer.insert(outcome(2)).unwrap();

        assert_eq!(buffer.insert(outcome(0)).unwrap_err().batch_index, 0);
        assert_eq!(buffer.insert(outcome(2)).unwrap_err().batch_index, 2);
        assert_eq!(buffer.next_to_apply(), 1);
    }
}

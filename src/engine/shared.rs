//! Append-only storage for per-row run data that snapshots copy on every row.

use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::okapi::schemars::r#gen::SchemaGenerator;
use rocket_okapi::okapi::schemars::schema::Schema;
use serde::{Serialize, Serializer};
use std::ops::Index;
use std::sync::Arc;

const CHUNK_LEN: usize = 64;

/// Append-only sequence with cheap clones.
///
/// Full chunks are frozen behind `Arc`s and shared by every clone. Only the open tail, at
/// most `CHUNK_LEN` items, is copied when the log is cloned. Freezing a chunk while clones
/// are alive copies the chunk list, never the items.
#[derive(Debug, Clone)]
pub struct SharedLog<T> {
    frozen: Arc<Vec<Arc<[T]>>>,
    tail: Vec<T>,
}

impl<T> Default for SharedLog<T> {
    fn default() -> Self {
        Self {
            frozen: Arc::default(),
            tail: Vec::new(),
        }
    }
}

impl<T> SharedLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.tail.push(item);
        if self.tail.len() == CHUNK_LEN {
            let full = std::mem::replace(&mut self.tail, Vec::with_capacity(CHUNK_LEN));
            Arc::make_mut(&mut self.frozen).push(Arc::from(full));
        }
    }

    pub fn len(&self) -> usize {
        self.frozen.len() * CHUNK_LEN + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        match self.frozen.get(index / CHUNK_LEN) {
            Some(chunk) => chunk.get(index % CHUNK_LEN),
            None => self.tail.get(index - self.frozen.len() * CHUNK_LEN),
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.tail
            .last()
            .or_else(|| self.frozen.last().and_then(|chunk| chunk.last()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.frozen
            .iter()
            .flat_map(|chunk| chunk.iter())
            .chain(self.tail.iter())
    }
}

impl<T: Clone> SharedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> FromIterator<T> for SharedLog<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut log = Self::new();
        for item in iter {
            log.push(item);
        }
        log
    }
}

impl<T> Index<usize> for SharedLog<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(item) => item,
            None => panic!("index {index} out of range for log of length {}", self.len()),
        }
    }
}

impl<T: Serialize> Serialize for SharedLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<T: JsonSchema> JsonSchema for SharedLog<T> {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        Vec::<T>::schema_name()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        Vec::<T>::json_schema(generator)
    }
}

/// Samples kept in ascending order, with their running sum.
///
/// Clones share the sorted buffer until the next insert.
#[derive(Debug, Clone, Default)]
pub struct SortedSamples {
    sorted: Arc<Vec<f64>>,
    sum: f64,
}

impl SortedSamples {
    pub fn insert(&mut self, sample: f64) {
        let sorted = Arc::make_mut(&mut self.sorted);
        let at = sorted.partition_point(|existing| existing.total_cmp(&sample).is_le());
        sorted.insert(at, sample);
        self.sum += sample;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.sorted
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_across_frozen_chunks_and_tail() {
        let log: SharedLog<usize> = (0..CHUNK_LEN * 2 + 5).collect();

        assert_eq!(log.len(), CHUNK_LEN * 2 + 5);
        assert_eq!(log[0], 0);
        assert_eq!(log[CHUNK_LEN - 1], CHUNK_LEN - 1);
        assert_eq!(log[CHUNK_LEN], CHUNK_LEN);
        assert_eq!(log[CHUNK_LEN * 2 + 4], CHUNK_LEN * 2 + 4);
        assert_eq!(log.get(CHUNK_LEN * 2 + 5), None);
        assert_eq!(log.last(), Some(&(CHUNK_LEN * 2 + 4)));
        assert_eq!(log.to_vec(), (0..CHUNK_LEN * 2 + 5).collect::<Vec<_>>());
    }

    #[test]
    fn last_of_exactly_full_chunks() {
        let log: SharedLog<usize> = (0..CHUNK_LEN).collect();
        assert_eq!(log.last(), Some(&(CHUNK_LEN - 1)));
        assert!(SharedLog::<usize>::new().last().is_none());
    }

    #[test]
    fn clones_share_frozen_chunks_and_stay_detached() {
        let mut log: SharedLog<usize> = (0..CHUNK_LEN + 3).collect();
        let copy = log.clone();
        assert!(Arc::ptr_eq(&log.frozen, &copy.frozen));

        for value in CHUNK_LEN + 3..CHUNK_LEN * 3 {
            log.push(value);
        }

        assert_eq!(copy.len(), CHUNK_LEN + 3);
        assert_eq!(copy.to_vec(), (0..CHUNK_LEN + 3).collect::<Vec<_>>());
        assert_eq!(log.len(), CHUNK_LEN * 3);
        assert!(Arc::ptr_eq(&log.frozen[0], &copy.frozen[0]));
    }

    #[test]
    fn serializes_as_a_flat_array() {
        let log: SharedLog<usize> = (0..CHUNK_LEN + 2).collect();
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json, serde_json::json!((0..CHUNK_LEN + 2).collect::<Vec<_>>()));
    }

    #[test]
    fn sorted_samples_keep_order_and_sum() {
        let mut samples = SortedSamples::default();
        for value in [5.0, 1.0, 3.0, 3.0, 2.0] {
            samples.insert(value);
        }
        let copy = samples.clone();
        samples.insert(0.5);

        assert_eq!(copy.as_slice(), &[1.0, 2.0, 3.0, 3.0, 5.0]);
        assert_eq!(samples.as_slice(), &[0.5, 1.0, 2.0, 3.0, 3.0, 5.0]);
        assert!((samples.sum() - 14.5).abs() < f64::EPSILON);
    }
}

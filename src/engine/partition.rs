use crate::engine::config::clamp_batch_size;
use crate::engine::types::Batch;
use crate::models::Row;

/// Split `rows` into contiguous batches of at most `batch_size` rows.
///
/// `batch_size` is clamped into the supported range rather than rejected. Batch `k` covers
/// row positions `[k * size, min(len, (k + 1) * size))`; the row values keep their own
/// indexes, which for a [`RowSequence`](crate::models::RowSequence) are those positions.
pub fn partition(rows: &[Row], batch_size: usize) -> Vec<Batch> {
    let size = clamp_batch_size(batch_size);

    rows.chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            start_offset: index * size,
            rows: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::MAX_BATCH_SIZE;
    use crate::models::RowSequence;

    fn rows(n: usize) -> Vec<Row> {
        RowSequence::new(
            vec!["a".to_string()],
            (0..n).map(|i| vec![i.to_string()]).collect(),
        )
        .rows
    }

    #[test]
    fn ten_rows_by_three() {
        let batches = partition(&rows(10), 3);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        let offsets: Vec<usize> = batches.iter().map(|b| b.start_offset).collect();
        assert_eq!(offsets, vec![0, 3, 6, 9]);
    }

    #[test]
    fn covers_every_row_exactly_once() {
        for n in 0..40 {
            for size in 1..8 {
                let batches = partition(&rows(n), size);
                assert_eq!(batches.len(), n.div_ceil(size), "n={n} size={size}");

                let covered: Vec<usize> = batches
                    .iter()
                    .flat_map(|b| b.rows.iter().map(|r| r.index))
                    .collect();
                assert_eq!(covered, (0..n).collect::<Vec<_>>());

                for (k, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index, k);
                    assert_eq!(batch.rows[0].index, batch.start_offset);
                }
            }
        }
    }

    #[test]
    fn clamps_out_of_range_sizes() {
        assert_eq!(partition(&rows(5), 0).len(), 5);
        let big = partition(&rows(60), 1000);
        assert!(big.iter().all(|b| b.len() <= MAX_BATCH_SIZE));
        assert_eq!(big.len(), 60usize.div_ceil(MAX_BATCH_SIZE));
    }

    #[test]
    fn empty_input_has_no_batches() {
        assert!(partition(&[], 5).is_empty());
    }
}

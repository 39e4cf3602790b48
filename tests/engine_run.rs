mod common;

use common::{ScriptedService, sequence};
use geobatch::engine::{
    BatchEngine, EngineConfig, ErrorKind, ProgressSink, ProgressSnapshot, RunError, partition,
};
use geobatch::store::JsonlRowStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Collects every published snapshot.
#[derive(Default)]
struct Recorder {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

impl ProgressSink for Recorder {
    fn on_snapshot(&self, snapshot: ProgressSnapshot) {
        self.snapshots.lock().push(snapshot);
    }
}

impl Recorder {
    fn take(&self) -> Vec<ProgressSnapshot> {
        std::mem::take(&mut *self.snapshots.lock())
    }
}

async fn run(
    service: Arc<ScriptedService>,
    config: EngineConfig,
    rows: usize,
) -> (Result<ProgressSnapshot, RunError>, Vec<ProgressSnapshot>) {
    let engine = BatchEngine::new(service, config);
    let recorder = Recorder::default();
    let result = engine
        .run("run test", sequence(rows), &recorder, CancellationToken::new())
        .await;
    (result, recorder.take())
}

#[test]
fn partition_covers_every_row_once() {
    for (rows, batch_size) in [(0, 3), (1, 1), (10, 3), (25, 25), (26, 25), (7, 100)] {
        let sequence = sequence(rows);
        let batches = partition(&sequence.rows, batch_size);
        let size = batch_size.clamp(1, 25);
        assert_eq!(batches.len(), rows.div_ceil(size));

        let covered: Vec<usize> = batches
            .iter()
            .flat_map(|batch| batch.rows.iter().map(|row| row.index))
            .collect();
        assert_eq!(covered, (0..rows).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn last_batch_finishing_first_is_still_applied_last() {
    // 10 rows by 3: batches start at 0, 3, 6 and 9. Batch 0 is held back.
    let service = ScriptedService::new().delay_batch(0, 150).build();

    let (result, snapshots) = run(Arc::clone(&service), EngineConfig::new(3, 2), 10).await;
    let final_snapshot = result.expect("run completes");

    let completed = service.completed_batches();
    let first = completed.iter().position(|&start| start == 0).unwrap();
    let last = completed.iter().position(|&start| start == 9).unwrap();
    assert!(last < first, "batch 3 should finish before batch 0: {completed:?}");

    let applied: Vec<usize> = snapshots
        .iter()
        .filter(|s| !s.state.is_complete)
        .filter_map(|s| s.state.last_applied_row)
        .collect();
    assert_eq!(applied, (0..10).collect::<Vec<_>>());

    let result_rows: Vec<usize> = final_snapshot
        .state
        .results
        .iter()
        .map(|row| row.row_index)
        .collect();
    assert_eq!(result_rows, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn processed_rows_reach_subscribers_in_strictly_increasing_order() {
    let service = ScriptedService::new()
        .delay_batch(0, 60)
        .delay_batch(8, 30)
        .skip_row(5)
        .build();

    let (_, snapshots) = run(service, EngineConfig::new(4, 3), 20).await;

    let mut seen = 0;
    let mut last_processed: Option<usize> = None;
    for snapshot in &snapshots {
        let results = &snapshot.state.results;
        assert!(results.len() >= seen, "results never shrink");
        for row in results.iter().skip(seen) {
            if let Some(previous) = last_processed {
                assert!(row.row_index > previous);
            }
            last_processed = Some(row.row_index);
        }
        seen = results.len();
    }
    assert_eq!(seen, 19);
}

#[tokio::test]
async fn progress_and_accounting_are_monotonic() {
    let service = ScriptedService::new()
        .delay_batch(5, 40)
        .fail_batch(10)
        .fail_row(11)
        .build();

    let (result, snapshots) = run(service, EngineConfig::new(5, 2), 23).await;
    let final_snapshot = result.expect("run completes");

    assert_eq!(snapshots.len(), 23 + 1, "one snapshot per row plus completion");

    let mut accounted = 0;
    let mut percent = 0;
    for snapshot in &snapshots[..snapshots.len() - 1] {
        let state = &snapshot.state;
        assert!(!state.is_complete);
        assert!(state.rows_accounted() > accounted);
        assert!(state.progress_percent >= percent);
        assert!(state.progress_percent <= 99);
        accounted = state.rows_accounted();
        percent = state.progress_percent;
    }

    let state = &final_snapshot.state;
    assert!(state.is_complete);
    assert_eq!(state.progress_percent, 100);
    assert_eq!(state.rows_accounted(), 23);
    assert_eq!(state.total_processed, 22);
    assert_eq!(state.skipped, 1);
    assert!(state.total_runtime_ms.is_some());
    assert_eq!(state.batches_applied, 5);
    assert_eq!(final_snapshot.latency.call_latency.count, 5);
}

#[tokio::test]
async fn grouped_failure_isolates_the_failing_row() {
    // Batch 2 covers rows 6, 7 and 8; its grouped call fails and row 7 fails on its own.
    let service = ScriptedService::new().fail_batch(6).fail_row(7).build();

    let (result, _) = run(Arc::clone(&service), EngineConfig::new(3, 2), 12).await;
    let state = result.expect("run completes").state;

    assert_eq!(state.total_processed, 11);
    assert_eq!(state.skipped, 1);
    assert_eq!(state.fallback_batches, 1);
    assert_eq!(service.row_calls(), 3);

    let processed: Vec<usize> = state.results.iter().map(|row| row.row_index).collect();
    assert!(processed.contains(&6) && processed.contains(&8));
    assert!(!processed.contains(&7));

    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].row_index, 7);
    assert_eq!(state.errors[0].kind, ErrorKind::RowError);
    assert!(state.errors[0].message.contains("row 7"));
}

#[tokio::test]
async fn skipped_rows_are_listed_but_not_failures() {
    let service = ScriptedService::new().skip_row(0).skip_row(3).build();

    let (result, _) = run(service, EngineConfig::new(2, 2), 4).await;
    let state = result.expect("run completes").state;

    assert_eq!(state.total_processed, 2);
    assert_eq!(state.skipped, 2);
    assert!(
        state
            .errors
            .iter()
            .all(|entry| entry.kind == ErrorKind::Skipped && entry.message == "no address found")
    );
    assert_eq!(state.fallback_batches, 0);
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limit() {
    let service = (0..5)
        .fold(ScriptedService::new(), |service, batch| {
            service.delay_batch(batch * 2, 30)
        })
        .build();

    let (result, _) = run(Arc::clone(&service), EngineConfig::new(2, 2), 10).await;
    result.expect("run completes");

    assert_eq!(service.batch_calls(), 5);
    assert_eq!(service.max_in_flight(), 2);
}

#[tokio::test]
async fn single_worker_runs_batches_one_at_a_time() {
    let service = ScriptedService::new().delay_batch(0, 20).delay_batch(3, 20).build();

    let (result, _) = run(Arc::clone(&service), EngineConfig::new(3, 1), 9).await;
    result.expect("run completes");

    assert_eq!(service.max_in_flight(), 1);
    assert_eq!(service.completed_batches(), vec![0, 3, 6]);
}

#[tokio::test]
async fn timed_out_grouped_call_falls_back_per_row() {
    let service = ScriptedService::new().delay_batch(0, 500).build();
    let config = EngineConfig::new(3, 2).with_call_timeout(Some(Duration::from_millis(25)));

    let (result, _) = run(Arc::clone(&service), config, 3).await;
    let snapshot = result.expect("run completes");

    assert_eq!(snapshot.state.total_processed, 3);
    assert_eq!(snapshot.state.fallback_batches, 1);
    assert_eq!(service.row_calls(), 3);
}

#[tokio::test]
async fn cancellation_returns_the_last_applied_state() {
    let service = ScriptedService::new().delay_batch(4, 5_000).build();
    let engine = BatchEngine::new(service, EngineConfig::new(2, 2));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let sink = move |snapshot: ProgressSnapshot| {
        if snapshot.state.rows_accounted() == 4 {
            trigger.cancel();
        }
    };

    let started = std::time::Instant::now();
    let err = engine
        .run("run test", sequence(8), &sink, cancel)
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(err, RunError::Cancelled { .. }));
    let partial = err.partial_snapshot().expect("cancelled runs carry a snapshot");
    assert_eq!(partial.state.rows_accounted(), 4);
    assert!(!partial.state.is_complete);
}

#[tokio::test]
async fn processed_rows_are_persisted_in_row_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.jsonl");
    let store = JsonlRowStore::open(&path).await.unwrap();

    let service = ScriptedService::new()
        .delay_batch(0, 50)
        .skip_row(4)
        .build();
    let engine = BatchEngine::new(service, EngineConfig::new(3, 3)).with_store(Arc::new(store));

    let snapshot = engine
        .run("run test", sequence(9), &|_: ProgressSnapshot| {}, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(snapshot.state.total_processed, 8);

    let written = tokio::fs::read_to_string(&path).await.unwrap();
    let indexes: Vec<u64> = written
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["row_index"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(indexes, vec![0, 1, 2, 3, 5, 6, 7, 8]);
}

#[tokio::test]
async fn only_failed_grouped_calls_count_as_fallbacks() {
    let service = ScriptedService::new().fail_batch(0).build();
    let (result, _) = run(Arc::clone(&service), EngineConfig::new(2, 1), 4).await;
    let state = result.unwrap().state;

    assert_eq!(state.batches_applied, 2);
    assert_eq!(state.fallback_batches, 1);
    assert_eq!(service.batch_calls(), 2);
    assert_eq!(service.row_calls(), 2);
}

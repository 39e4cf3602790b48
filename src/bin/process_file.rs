use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use geobatch::cleaning::{CleaningConfig, HttpCleaningClient};
use geobatch::engine::{
    BatchEngine, EngineConfig, ErrorEntry, LogProgress, ProcessedRow, ProgressSnapshot, RunError,
    SharedLog, StatusCounts, TelemetrySummary,
};
use geobatch::input::load_rows;
use geobatch::store::JsonlRowStore;

#[derive(Parser, Debug)]
#[command(
    name = "geobatch-process",
    about = "Clean and geocode the addresses in a JSON row file"
)]
struct Args {
    /// Input rows: `{"header": [...], "rows": [[...]]}` or an array of objects.
    #[arg(long)]
    input: PathBuf,

    /// Where to write the final report as JSON.
    #[arg(long)]
    output: PathBuf,

    /// Rows per grouped call (1-25). Defaults to `BATCH_SIZE` or 5.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Batches in flight at once (1-5). Defaults to `MAX_WORKERS` or 2.
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Upper bound on a single cleaning call, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Cleaning service base URL. Defaults to `CLEANING_SERVICE_URL`.
    #[arg(long)]
    service_url: Option<String>,

    /// Also append every processed row to this JSON-lines file as it is applied.
    #[arg(long)]
    persist: Option<PathBuf>,
}

/// Final snapshot without the raw latency samples.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    total_expected: usize,
    total_processed: usize,
    skipped: usize,
    status_counts: &'a StatusCounts,
    fallback_batches: usize,
    total_runtime_ms: Option<f64>,
    latency: &'a TelemetrySummary,
    results: &'a SharedLog<Arc<ProcessedRow>>,
    errors: &'a SharedLog<ErrorEntry>,
}

impl<'a> Report<'a> {
    fn from_snapshot(snapshot: &'a ProgressSnapshot) -> Self {
        let state = &snapshot.state;
        Self {
            total_expected: state.total_expected,
            total_processed: state.total_processed,
            skipped: state.skipped,
            status_counts: &state.status_counts,
            fallback_batches: state.fallback_batches,
            total_runtime_ms: state.total_runtime_ms,
            latency: &snapshot.latency,
            results: &state.results,
            errors: &state.errors,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    geobatch::init_logger("info");

    let args = Args::parse();

    let mut cleaning_config = CleaningConfig::from_env();
    if let Some(url) = args.service_url {
        cleaning_config = cleaning_config.with_base_url(url);
    }

    let mut engine_config = EngineConfig::from_env();
    if let Some(batch_size) = args.batch_size {
        engine_config = engine_config.with_batch_size(batch_size);
    }
    if let Some(max_concurrency) = args.max_concurrency {
        engine_config = engine_config.with_max_concurrency(max_concurrency);
    }
    if let Some(timeout_ms) = args.timeout_ms {
        engine_config = engine_config.with_call_timeout(Some(Duration::from_millis(timeout_ms)));
    }

    let sequence = load_rows(&args.input).await?;
    log::info!(
        "loaded {} rows with {} columns from {}",
        sequence.len(),
        sequence.header.len(),
        args.input.display()
    );

    let client = HttpCleaningClient::new(&cleaning_config)?;
    let mut engine = BatchEngine::new(Arc::new(client), engine_config);
    if let Some(path) = &args.persist {
        engine = engine.with_store(Arc::new(JsonlRowStore::open(path).await?));
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let label = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string());
    let progress = LogProgress::new(label.clone());

    let snapshot = match engine.run(&label, sequence, &progress, cancel).await {
        Ok(snapshot) => snapshot,
        Err(RunError::Cancelled { snapshot }) => {
            write_report(&args.output, &snapshot).await?;
            writeln!(
                io::stderr(),
                "cancelled: partial report with {} rows written to {}",
                snapshot.state.rows_accounted(),
                args.output.display()
            )?;
            std::process::exit(130);
        }
        Err(err) => {
            writeln!(io::stderr(), "error: {err}")?;
            std::process::exit(1);
        }
    };

    write_report(&args.output, &snapshot).await?;
    log::info!("report written to {}", args.output.display());

    Ok(())
}

async fn write_report(
    path: &Path,
    snapshot: &ProgressSnapshot,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = serde_json::to_vec_pretty(&Report::from_snapshot(snapshot))?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

//! Run management endpoints: start, inspect, cancel and remove batch runs.

use crate::engine::{BatchEngine, EngineConfig};
use crate::error::ApiError;
use crate::input::from_tabular;
use crate::registry::{RunDetail, RunRegistry, RunStatus, RunSummary};
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Request body for starting a run.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    /// Column names, in cell order.
    pub header: Vec<String>,
    /// One array of cells per row. Non-string cells are stringified.
    pub rows: Vec<Vec<Value>>,
    /// Rows per grouped call; clamped to 1..=25.
    pub batch_size: Option<usize>,
    /// Concurrent batches; clamped to 1..=5.
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub total_rows: usize,
    pub batch_size: usize,
    pub max_concurrency: usize,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunActionResponse {
    pub run_id: Uuid,
    /// Status when the request arrived; a cancelled run moves to `cancelled` shortly after.
    pub status: RunStatus,
    pub message: String,
}

fn parse_run_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("Invalid run id: {id}")))
}

/// Start a run over the submitted rows. Returns immediately with the run id.
#[openapi(tag = "Runs")]
#[post("/runs", data = "<request>")]
pub async fn start_run(
    request: Json<StartRunRequest>,
    registry: &State<RunRegistry>,
    engine: &State<BatchEngine>,
) -> Result<Json<StartRunResponse>, ApiError> {
    let request = request.into_inner();
    let sequence = from_tabular(request.header, request.rows)?;

    let base = engine.config();
    let config = EngineConfig::new(
        request.batch_size.unwrap_or(base.batch_size()),
        request.max_concurrency.unwrap_or(base.max_concurrency()),
    )
    .with_call_timeout(base.call_timeout());

    let total_rows = sequence.len();
    let (batch_size, max_concurrency) = (config.batch_size(), config.max_concurrency());
    let run_id = registry.start(engine.inner().clone().with_config(config), sequence);

    Ok(Json(StartRunResponse {
        run_id,
        total_rows,
        batch_size,
        max_concurrency,
    }))
}

/// List every run known to this process, oldest first.
#[openapi(tag = "Runs")]
#[get("/runs")]
pub async fn list_runs(registry: &State<RunRegistry>) -> Json<Vec<RunSummary>> {
    Json(registry.list())
}

/// Status and latest progress snapshot of one run.
#[openapi(tag = "Runs")]
#[get("/runs/<id>")]
pub async fn get_run(id: &str, registry: &State<RunRegistry>) -> Result<Json<RunDetail>, ApiError> {
    let run_id = parse_run_id(id)?;
    registry
        .get(&run_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Run {run_id} not found")))
}

/// Request cancellation of a running run.
#[openapi(tag = "Runs")]
#[post("/runs/<id>/cancel")]
pub async fn cancel_run(
    id: &str,
    registry: &State<RunRegistry>,
) -> Result<Json<RunActionResponse>, ApiError> {
    let run_id = parse_run_id(id)?;
    let status = registry
        .cancel(&run_id)
        .ok_or_else(|| ApiError::NotFound(format!("Run {run_id} not found")))?;

    if status.is_finished() {
        return Err(ApiError::Conflict(format!(
            "Run {run_id} already finished as {status:?}"
        )));
    }

    Ok(Json(RunActionResponse {
        run_id,
        status,
        message: "Cancellation requested".to_string(),
    }))
}

/// Forget a finished run and its results.
#[openapi(tag = "Runs")]
#[delete("/runs/<id>")]
pub async fn delete_run(
    id: &str,
    registry: &State<RunRegistry>,
) -> Result<Json<RunActionResponse>, ApiError> {
    let run_id = parse_run_id(id)?;
    let status = registry
        .remove(&run_id)
        .ok_or_else(|| ApiError::NotFound(format!("Run {run_id} not found")))?;

    if !status.is_finished() {
        return Err(ApiError::Conflict(format!(
            "Run {run_id} is still running; cancel it first"
        )));
    }

    Ok(Json(RunActionResponse {
        run_id,
        status,
        message: "Run removed".to_string(),
    }))
}

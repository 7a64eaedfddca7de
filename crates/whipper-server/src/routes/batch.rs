//! Batch run routes: start a run in the background, poll its status.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use super::ApiResult;
use crate::state::{AppState, StatusObserver};
use whipper_core::{Error, Result};
use whipper_runtime::{BatchExecutor, RunRequest, RunStatus, RunSummary};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batch/run", post(start_run))
        .route("/batch/status", get(get_status))
}

/// Validate `request`, then run it on a background task.
///
/// Without an uploaded table but with a target column, the table saved for
/// the prompt is used. An uploaded table replaces the saved one.
async fn start_run(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<RunRequest>,
) -> ApiResult<Response> {
    let prompt = state.registry.find_unique(&request.prompt_id)?;

    let uploaded = request.inputs.is_some();
    if !uploaded && request.target_field.is_some() && !request.redo_flagged {
        let table = state.inputs.load(&prompt.id)?.ok_or_else(|| {
            Error::InvalidInput(format!("No saved input table for '{}'", prompt.id))
        })?;
        request.inputs = Some(table);
    }

    if !state.begin_run(&prompt.id) {
        let body = json!({ "error": "A batch run is already in progress" });
        return Ok((StatusCode::CONFLICT, Json(body)).into_response());
    }

    if let Some(table) = request.inputs.as_ref().filter(|_| uploaded) {
        if let Err(e) = state.inputs.save(&prompt.id, table) {
            state.cancel_run();
            return Err(e.into());
        }
    }

    info!("Starting batch run for {}", prompt.id);
    let task_state = state.clone();
    tokio::spawn(async move {
        let outcome = run_batch(&task_state, &request).await;
        task_state.finish_run(outcome);
    });

    let body = json!({ "started": true, "promptId": prompt.id });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn run_batch(state: &AppState, request: &RunRequest) -> Result<RunSummary> {
    let client = state.chat_client().await?;
    let mut client = client.lock().await;
    let observer = StatusObserver { state };
    let executor = BatchExecutor::new(
        &state.registry,
        &state.results,
        state.retry_policy.clone(),
        &observer,
    );
    executor.run(&mut *client, request).await
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<RunStatus> {
    Json(state.run_status.read().clone())
}

//! Result cache routes: browse, review, delete.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::{ApiError, ApiResult};
use crate::state::AppState;
use whipper_core::Error;
use whipper_store::ReviewEdit;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/results", get(list_results))
        .route("/results/{id}", get(get_results).delete(delete_results))
        .route("/results/{id}/review", put(save_review))
}

async fn list_results(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "promptIds": state.results.list() }))
}

async fn get_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let rows = state.results.load(&id)?;
    let flagged = rows.iter().filter(|r| r.flagged).count();
    Ok(Json(json!({
        "promptId": id,
        "rows": rows,
        "total": rows.len(),
        "flagged": flagged,
    })))
}

async fn delete_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.results.delete(&id)? {
        return Err(ApiError(Error::NotFound(format!("Results for '{}'", id))));
    }
    Ok(Json(json!({ "success": true })))
}

async fn save_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(edits): Json<Vec<ReviewEdit>>,
) -> ApiResult<Json<Value>> {
    let rows = state.results.save_review(&id, &edits)?;
    Ok(Json(json!({ "promptId": id, "rows": rows })))
}

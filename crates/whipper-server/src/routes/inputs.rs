//! Saved input tables, one per prompt.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use super::ApiResult;
use crate::state::AppState;
use whipper_store::InputTable;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/inputs/{id}", get(get_inputs).put(save_inputs))
}

async fn get_inputs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let table = state.inputs.load(&id)?.unwrap_or_default();
    Ok(Json(json!({
        "promptId": id,
        "columns": table.columns(),
        "rows": table.rows,
    })))
}

async fn save_inputs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(table): Json<InputTable>,
) -> ApiResult<Json<Value>> {
    state.inputs.save(&id, &table)?;
    Ok(Json(json!({
        "success": true,
        "columns": table.columns(),
        "total": table.rows.len(),
    })))
}

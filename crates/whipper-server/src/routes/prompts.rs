//! Prompt registry routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, ApiResult};
use crate::state::AppState;
use whipper_core::Error;
use whipper_store::{AddPromptRequest, PromptDefinition};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/prompts", get(list_prompts).post(add_prompt))
        .route(
            "/prompts/{id}",
            get(get_prompt).put(set_prompt).delete(delete_prompt),
        )
}

#[derive(Debug, Deserialize)]
struct SetPromptBody {
    prompt: String,
}

async fn list_prompts(State(state): State<Arc<AppState>>) -> Json<Value> {
    let prompts = state.registry.list();
    Json(json!({ "prompts": prompts, "total": prompts.len() }))
}

async fn add_prompt(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddPromptRequest>,
) -> ApiResult<(StatusCode, Json<PromptDefinition>)> {
    let prompt = state.registry.add(&body.prompt, body.name.trim())?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

async fn get_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PromptDefinition>> {
    Ok(Json(state.registry.find_unique(&id)?))
}

async fn set_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SetPromptBody>,
) -> ApiResult<Json<PromptDefinition>> {
    Ok(Json(state.registry.set(&id, &body.prompt)?))
}

async fn delete_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.registry.delete(&id)? {
        return Err(ApiError(Error::NotFound(format!("Prompt '{}'", id))));
    }
    Ok(Json(json!({ "success": true })))
}

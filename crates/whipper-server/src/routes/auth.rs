//! Browser and login routes.
//!
//! `POST /auth` opens a visible browser on the chat site for an interactive
//! login. Closing it afterwards drops the cached session, so the next run
//! relaunches headless and picks up the new cookies.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::ApiResult;
use crate::state::AppState;
use whipper_browser::{BrowserStatus, DrivenBrowser};
use whipper_chat::global_client;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth", post(start_auth))
        .route("/browser/status", get(get_status))
        .route("/browser/close", post(close_browser))
        .route("/browser/headless", put(set_headless))
}

#[derive(Debug, Deserialize)]
struct HeadlessBody {
    headless: bool,
}

fn busy() -> Response {
    let body = json!({ "error": "A batch run is in progress" });
    (StatusCode::CONFLICT, Json(body)).into_response()
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<BrowserStatus> {
    Json(state.browser.status().await)
}

async fn start_auth(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    if state.run_status.read().running {
        return Ok(busy());
    }
    state.browser.launch_visible().await?;
    info!("Browser opened for login");
    Ok(Json(json!({
        "success": true,
        "message": "Log in to the chat site in the opened browser, then close it",
        "status": state.browser.status().await,
    }))
    .into_response())
}

async fn close_browser(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    if state.run_status.read().running {
        return Ok(busy());
    }
    match global_client().get() {
        Some(client) => client.lock().await.close().await?,
        None => state.browser.close().await?,
    }
    Ok(Json(json!({ "success": true })).into_response())
}

async fn set_headless(
    State(state): State<Arc<AppState>>,
    Json(body): Json<HeadlessBody>,
) -> Json<BrowserStatus> {
    state.browser.set_headless(body.headless);
    Json(state.browser.status().await)
}

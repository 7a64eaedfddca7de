//! Minimal Chrome DevTools Protocol access: endpoint probing and one-shot calls.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use whipper_core::{Error, Result};

use crate::types::{BrowserCookie, CdpVersionInfo};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve CDP version metadata from `/json/version` on `port`.
pub async fn fetch_version(port: u16) -> Result<CdpVersionInfo> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(400))
        .build()
        .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;
    let mut last_error = "no response".to_string();

    for url in [
        format!("http://127.0.0.1:{}/json/version", port),
        format!("http://localhost:{}/json/version", port),
    ] {
        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = e.to_string();
                continue;
            }
        };

        if !response.status().is_success() {
            last_error = format!("unexpected status {}", response.status());
            continue;
        }

        return response
            .json()
            .await
            .map_err(|e| Error::Browser(format!("Failed to parse CDP response: {}", e)));
    }

    Err(Error::Browser(format!(
        "Failed to reach debugging port {}: {}",
        port, last_error
    )))
}

/// Issue one CDP command over a fresh websocket and return its `result`.
pub async fn call(ws_url: &str, method: &str, params: Value) -> Result<Value> {
    tokio::time::timeout(CALL_TIMEOUT, call_inner(ws_url, method, params))
        .await
        .map_err(|_| Error::Timeout(format!("CDP call {}", method)))?
}

async fn call_inner(ws_url: &str, method: &str, params: Value) -> Result<Value> {
    let (ws, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| Error::Browser(format!("CDP connect failed: {}", e)))?;
    let (mut tx, mut rx) = ws.split();

    let request = json!({ "id": 1, "method": method, "params": params });
    tx.send(Message::Text(request.to_string()))
        .await
        .map_err(|e| Error::Browser(format!("CDP send failed: {}", e)))?;

    while let Some(message) = rx.next().await {
        let message = message.map_err(|e| Error::Browser(format!("CDP read failed: {}", e)))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply: Value = serde_json::from_str(&text)?;
        // Events carry no id; skip until our reply arrives.
        if reply.get("id").and_then(|v| v.as_i64()) != Some(1) {
            continue;
        }

        let _ = tx.close().await;
        if let Some(err) = reply.get("error") {
            return Err(Error::Browser(format!("CDP {} failed: {}", method, err)));
        }
        debug!("CDP {} answered", method);
        return Ok(reply.get("result").cloned().unwrap_or(Value::Null));
    }

    Err(Error::Browser(format!(
        "CDP connection closed before {} answered",
        method
    )))
}

/// Fetch every cookie the browser holds.
pub async fn get_cookies(ws_url: &str) -> Result<Vec<BrowserCookie>> {
    let result = call(ws_url, "Storage.getCookies", json!({})).await?;
    let cookies = result.get("cookies").cloned().unwrap_or(Value::Array(Vec::new()));
    Ok(serde_json::from_value(cookies)?)
}

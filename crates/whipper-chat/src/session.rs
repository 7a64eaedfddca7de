//! Session manager: access token acquisition through the browser's identity.

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use whipper_browser::BrowserIdentity;
use whipper_core::{Error, Result};

use crate::config::ChatConfig;

/// Authentication state fetched from the session endpoint. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub access_token: Option<String>,
    pub payload: Value,
}

impl Session {
    pub fn from_payload(payload: Value) -> Self {
        let access_token = payload
            .get("accessToken")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Self {
            access_token,
            payload,
        }
    }

    /// A session without a token is kept but cannot authorize requests.
    pub fn is_usable(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Caches the current session and refreshes it on demand.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Return the cached session, refreshing only when none is cached.
    pub async fn ensure_session(
        &mut self,
        client: &Client,
        config: &ChatConfig,
        identity: &BrowserIdentity,
    ) -> Result<Session> {
        if let Some(session) = &self.current {
            return Ok(session.clone());
        }
        self.refresh_session(client, config, identity).await
    }

    /// Fetch the session endpoint with the browser's cookies and cache the result.
    pub async fn refresh_session(
        &mut self,
        client: &Client,
        config: &ChatConfig,
        identity: &BrowserIdentity,
    ) -> Result<Session> {
        let url = config.session_url();
        debug!("Refreshing session from {}", url);

        let mut request = client.get(&url).header("Accept", "application/json");
        if !identity.cookie_header.is_empty() {
            request = request.header("Cookie", &identity.cookie_header);
        }
        if let Some(ua) = &identity.user_agent {
            request = request.header("User-Agent", ua);
        }

        let fetch = async {
            let response = request
                .send()
                .await
                .map_err(|e| Error::Http(format!("Session request failed: {}", e)))?;
            if !response.status().is_success() {
                return Err(Error::Http(format!(
                    "Session endpoint returned {}",
                    response.status()
                )));
            }
            response
                .json::<Value>()
                .await
                .map_err(|e| Error::Http(format!("Invalid session payload: {}", e)))
        };

        let payload = tokio::time::timeout(config.session_timeout(), fetch)
            .await
            .map_err(|_| Error::Timeout("session refresh".into()))??;

        let session = Session::from_payload(payload);
        if session.is_usable() {
            info!("Session refreshed");
        } else {
            warn!("Session payload has no access token; log in with `whipper auth`");
        }
        self.current = Some(session.clone());
        Ok(session)
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

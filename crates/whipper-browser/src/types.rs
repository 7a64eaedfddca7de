//! Browser connector types.

use serde::{Deserialize, Serialize};

/// `/json/version` response subset from the Chrome DevTools Protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpVersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
    #[serde(rename = "Browser")]
    pub browser: Option<String>,
    #[serde(rename = "User-Agent")]
    pub user_agent: Option<String>,
}

/// Cookie as reported by `Storage.getCookies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
    #[serde(default)]
    pub expires: Option<f64>,
}

impl BrowserCookie {
    /// Whether the cookie belongs to `domain` or one of its subdomains.
    pub fn matches_domain(&self, domain: &str) -> bool {
        let own = self.domain.trim_start_matches('.');
        let wanted = domain.trim_start_matches('.');
        own == wanted || own.ends_with(&format!(".{}", wanted))
    }
}

/// What the chat layer needs from the driven browser to act as it.
#[derive(Debug, Clone, Default)]
pub struct BrowserIdentity {
    /// `Cookie` header value carrying the logged-in session.
    pub cookie_header: String,
    /// The browser's own user agent, so requests look like the page's.
    pub user_agent: Option<String>,
}

/// Browser runtime status.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub headless: bool,
    #[serde(skip_serializing_if = "Option::is_none", rename = "launchedAt")]
    pub launched_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "browserVersion")]
    pub browser_version: Option<String>,
    #[serde(rename = "temporaryProfile")]
    pub temporary_profile: bool,
}

/// Build a `Cookie` header from the cookies of the allowed domains.
pub fn cookie_header(cookies: &[BrowserCookie], domains: &[String]) -> String {
    cookies
        .iter()
        .filter(|c| domains.iter().any(|d| c.matches_domain(d)))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

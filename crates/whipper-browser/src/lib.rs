//! Driven browser: Chrome lifecycle and CDP cookie extraction.
//!
//! Keeps one Chromium instance logged in to the chat site and lends its
//! cookies and user agent to the HTTP transport.

pub mod cdp;
pub mod config;
pub mod driver;
pub mod manager;
pub mod types;

pub use config::BrowserConfig;
pub use driver::{DrivenBrowser, StaticBrowser};
pub use manager::BrowserManager;
pub use types::*;

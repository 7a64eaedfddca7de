//! The seam between the chat layer and whatever holds the logged-in session.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use whipper_core::Result;

use crate::types::BrowserIdentity;

/// A browser the chat client drives: it lends its identity and can be recycled.
#[async_trait]
pub trait DrivenBrowser: Send + Sync {
    /// Cookies and user agent of the logged-in page, launching if needed.
    async fn identity(&self) -> Result<BrowserIdentity>;

    /// Close the browser and start a fresh process.
    async fn relaunch(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Fixed identity with no process behind it. Counts relaunches.
#[derive(Debug, Default)]
pub struct StaticBrowser {
    identity: BrowserIdentity,
    relaunches: AtomicUsize,
}

impl StaticBrowser {
    pub fn new(cookie_header: impl Into<String>) -> Self {
        Self {
            identity: BrowserIdentity {
                cookie_header: cookie_header.into(),
                user_agent: None,
            },
            relaunches: AtomicUsize::new(0),
        }
    }

    pub fn relaunch_count(&self) -> usize {
        self.relaunches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DrivenBrowser for StaticBrowser {
    async fn identity(&self) -> Result<BrowserIdentity> {
        Ok(self.identity.clone())
    }

    async fn relaunch(&self) -> Result<()> {
        self.relaunches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

//! Shared application state.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use whipper_browser::{BrowserManager, DrivenBrowser};
use whipper_chat::{global_client, ChatClient, ChatConfig};
use whipper_core::{Result, WhipperConfig};
use whipper_runtime::{
    BatchObserver, Notice, RetryPolicy, RunStatus, RunSummary, TracingObserver,
};
use whipper_store::{InputStore, PromptRegistry, ResultStore};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: WhipperConfig,
    pub chat_config: RwLock<ChatConfig>,
    pub browser: Arc<BrowserManager>,
    pub registry: PromptRegistry,
    pub results: ResultStore,
    pub inputs: InputStore,
    pub retry_policy: RetryPolicy,
    pub run_status: RwLock<RunStatus>,
}

impl AppState {
    pub fn new(config: WhipperConfig) -> Self {
        let paths = &config.data_paths;
        let chat_config = ChatConfig::load(&paths.chat_config_file);
        info!("Chat endpoint: {}", chat_config.base_url);

        Self {
            chat_config: RwLock::new(chat_config),
            browser: Arc::new(BrowserManager::new(&paths.browser)),
            registry: PromptRegistry::new(&paths.prompts_file),
            results: ResultStore::new(&paths.results),
            inputs: InputStore::new(&paths.inputs),
            retry_policy: RetryPolicy::default(),
            run_status: RwLock::new(RunStatus::default()),
            config,
        }
    }

    /// The process-wide chat client, connected on first use.
    pub async fn chat_client(&self) -> Result<Arc<Mutex<ChatClient>>> {
        let config = self.chat_config.read().clone();
        let browser: Arc<dyn DrivenBrowser> = self.browser.clone();
        global_client()
            .get_or_connect(|| async move { ChatClient::new(config, browser) })
            .await
    }

    /// Claim the run slot for `prompt_id`. Returns false when a run is active.
    pub fn begin_run(&self, prompt_id: &str) -> bool {
        let mut status = self.run_status.write();
        if status.running {
            return false;
        }
        *status = RunStatus {
            running: true,
            prompt_id: Some(prompt_id.to_string()),
            ..RunStatus::default()
        };
        true
    }

    /// Release the run slot without recording an outcome.
    pub fn cancel_run(&self) {
        self.run_status.write().running = false;
    }

    /// Close the browser on exit.
    ///
    /// A run still in progress holds the chat client lock, so its browser is
    /// closed directly rather than waiting for the run to finish.
    pub async fn shutdown(&self) -> Result<()> {
        if self.run_status.read().running {
            warn!("Closing the browser under an unfinished batch run");
            return self.browser.close().await;
        }
        match global_client().get() {
            Some(client) => client.lock().await.close().await,
            None => self.browser.close().await,
        }
    }

    /// Release the run slot, recording how the run ended.
    pub fn finish_run(&self, outcome: Result<RunSummary>) {
        let mut status = self.run_status.write();
        status.running = false;
        status.last_run = Some(chrono::Local::now().to_rfc3339());
        match outcome {
            Ok(summary) => {
                status.output.push(format!(
                    "Finished: {} of {} rows processed",
                    summary.processed, summary.total
                ));
                status.summary = Some(summary);
            }
            Err(e) => {
                warn!("Batch run failed: {}", e);
                status.output.push(format!("Error: {}", e));
                status.error = Some(e.to_string());
            }
        }
    }
}

/// Mirrors executor progress and notices into [`RunStatus`].
pub struct StatusObserver<'a> {
    pub state: &'a AppState,
}

impl BatchObserver for StatusObserver<'_> {
    fn on_progress(&self, percent: u8) {
        self.state.run_status.write().progress = percent;
    }

    fn on_notice(&self, notice: &Notice) {
        TracingObserver.on_notice(notice);
        self.state.run_status.write().output.push(notice.to_string());
    }
}

//! Submission with bounded retry, backoff and client reset.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use whipper_chat::{ChatClient, Reply, ThreadOverride};
use whipper_core::{Error, Result};

use crate::observer::BatchObserver;
use crate::types::Notice;

/// What the executor needs from a chat client.
#[async_trait]
pub trait ChatBackend: Send {
    /// Whole reply, or `None` when the call produced nothing usable.
    async fn ask(&mut self, prompt: &str, overrides: &ThreadOverride) -> Result<Option<Reply>>;

    /// Discard the session and browser and start over.
    async fn reset(&mut self) -> Result<()>;

    fn new_conversation(&mut self);
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn ask(&mut self, prompt: &str, overrides: &ThreadOverride) -> Result<Option<Reply>> {
        ChatClient::ask(self, prompt, overrides).await
    }

    async fn reset(&mut self) -> Result<()> {
        ChatClient::reset(self).await
    }

    fn new_conversation(&mut self) {
        ChatClient::new_conversation(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Sleep between a failed attempt and the reset that precedes the next.
    #[serde(with = "secs", default = "default_backoff")]
    pub backoff: Duration,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: default_backoff(),
            max_attempts: default_max_attempts(),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Submit `prompt` until a reply arrives or the policy's attempts run out.
///
/// An empty reply or a recoverable error counts as a failed attempt; each one
/// is followed by the backoff sleep and a client reset. Other errors, such as
/// an unusable session, are returned at once.
pub async fn submit<B: ChatBackend + ?Sized>(
    backend: &mut B,
    prompt: &str,
    overrides: &ThreadOverride,
    policy: &RetryPolicy,
    observer: &dyn BatchObserver,
) -> Result<Reply> {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let reason = match backend.ask(prompt, overrides).await {
            Ok(Some(reply)) => {
                if attempt > 1 {
                    observer.on_notice(&Notice::Recovered { attempts: attempt });
                }
                return Ok(reply);
            }
            Ok(None) => "empty reply".to_string(),
            Err(e) if e.is_recoverable() => e.to_string(),
            Err(e) => return Err(e),
        };

        if attempt == max_attempts {
            break;
        }

        observer.on_notice(&Notice::SubmissionFailed {
            attempt,
            max_attempts,
            reason,
            backoff_secs: policy.backoff.as_secs(),
        });
        tokio::time::sleep(policy.backoff).await;

        match backend.reset().await {
            Ok(()) => debug!("Client reset before attempt {}", attempt + 1),
            Err(e) if e.is_recoverable() => {
                observer.on_notice(&Notice::ResetFailed {
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::RetriesExhausted {
        attempts: max_attempts,
    })
}

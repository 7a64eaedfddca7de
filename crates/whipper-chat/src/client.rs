//! Chat client: one driven browser, one session, one conversation thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::Stream;
use reqwest::Client;
use tokio::sync::{Mutex, OnceCell};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use whipper_browser::{BrowserIdentity, DrivenBrowser};
use whipper_core::{Error, Result};

use crate::config::ChatConfig;
use crate::session::SessionManager;
use crate::thread::{ConversationThread, ThreadOverride};
use crate::transport::{stream_conversation, StreamChunk};
use crate::types::Reply;

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

const REAUTHENTICATE: &str =
    "The chat session has no access token. Run `whipper auth`, log in, then retry.";

pub struct ChatClient {
    http: Client,
    config: ChatConfig,
    browser: Arc<dyn DrivenBrowser>,
    sessions: SessionManager,
    thread: ConversationThread,
}

impl ChatClient {
    pub fn new(config: ChatConfig, browser: Arc<dyn DrivenBrowser>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            browser,
            sessions: SessionManager::new(),
            thread: ConversationThread::new(),
        })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn thread(&self) -> &ConversationThread {
        &self.thread
    }

    /// Continue from `thread` on the next call without explicit ids.
    pub fn set_thread(&mut self, thread: ConversationThread) {
        self.thread = thread;
    }

    /// Start a fresh conversation on the next call.
    pub fn new_conversation(&mut self) {
        self.thread.reset();
    }

    async fn authorize(&mut self) -> Result<(BrowserIdentity, String)> {
        let identity = self.browser.identity().await?;
        let session = self
            .sessions
            .ensure_session(&self.http, &self.config, &identity)
            .await?;
        match session.access_token {
            Some(token) => Ok((identity, token)),
            None => Err(Error::SessionUnusable(REAUTHENTICATE.into())),
        }
    }

    /// Stream the reply to `prompt`.
    ///
    /// An unusable session is reported in-band, before any request is sent.
    /// The stream's `Done` chunk carries the thread after the call; it is not
    /// adopted by the client.
    pub async fn ask_stream(&mut self, prompt: &str, overrides: &ThreadOverride) -> Result<BoxedStream> {
        let thread = self.thread.resolve(overrides);
        let (identity, token) = match self.authorize().await {
            Ok(auth) => auth,
            Err(Error::SessionUnusable(msg)) => {
                warn!("{}", msg);
                return Ok(Box::pin(futures::stream::iter(vec![
                    StreamChunk::Error(msg),
                    StreamChunk::Done { thread },
                ])));
            }
            Err(e) => return Err(e),
        };

        Ok(Box::pin(stream_conversation(
            self.http.clone(),
            &self.config,
            identity,
            token,
            prompt.to_string(),
            thread,
        )))
    }

    /// Whole reply to `prompt`, or `None` when the call produced no usable text.
    ///
    /// On success the client adopts the returned thread.
    pub async fn ask(&mut self, prompt: &str, overrides: &ThreadOverride) -> Result<Option<Reply>> {
        let thread = self.thread.resolve(overrides);
        let (identity, token) = self.authorize().await?;

        let mut stream = Box::pin(stream_conversation(
            self.http.clone(),
            &self.config,
            identity,
            token,
            prompt.to_string(),
            thread,
        ));

        let mut text = String::new();
        let mut failure = None;
        let mut last_thread = None;
        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::Token(token) => text.push_str(&token),
                StreamChunk::Error(msg) => failure = Some(msg),
                StreamChunk::Done { thread } => last_thread = Some(thread),
            }
        }

        if let Some(msg) = failure {
            warn!("Discarding reply: {}", msg);
            return Ok(None);
        }
        let Some(thread) = last_thread else {
            return Err(Error::Internal("reply stream ended without Done".into()));
        };
        if text.is_empty() {
            return Ok(None);
        }

        self.thread = thread.clone();
        Ok(Some(Reply { text, thread }))
    }

    /// Relaunch the browser, drop the session and start a new conversation.
    pub async fn reset(&mut self) -> Result<()> {
        info!("Resetting chat client");
        self.sessions.clear();
        self.thread.reset();
        self.browser.relaunch().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.sessions.clear();
        self.browser.close().await
    }
}

// ---------------------------------------------------------------------------
// Process-wide client
// ---------------------------------------------------------------------------

/// Holds at most one value for the life of the slot; later connects reuse it.
pub struct ClientSlot<T> {
    cell: OnceCell<Arc<Mutex<T>>>,
}

impl<T> ClientSlot<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The existing value, or the one `connect` builds if the slot is empty.
    /// `connect` is never run once a value is present.
    pub async fn get_or_connect<F, Fut>(&self, connect: F) -> Result<Arc<Mutex<T>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = self
            .cell
            .get_or_try_init(|| async move { Ok::<_, Error>(Arc::new(Mutex::new(connect().await?))) })
            .await?;
        Ok(value.clone())
    }

    pub fn get(&self) -> Option<Arc<Mutex<T>>> {
        self.cell.get().cloned()
    }
}

impl<T> Default for ClientSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The one chat client of this process.
pub fn global_client() -> &'static ClientSlot<ChatClient> {
    static SLOT: OnceLock<ClientSlot<ChatClient>> = OnceLock::new();
    SLOT.get_or_init(ClientSlot::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use whipper_browser::StaticBrowser;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sse(message_id: &str, text: &str) -> Vec<u8> {
        let event = json!({
            "message": {
                "id": message_id,
                "author": {"role": "assistant"},
                "content": {"content_type": "text", "parts": [text]},
            },
            "conversation_id": "conv-1",
        });
        format!("data: {}\n\ndata: [DONE]\n\n", event).into_bytes()
    }

    async fn mount_session(server: &MockServer, token: Option<&str>) {
        let body = match token {
            Some(t) => json!({"accessToken": t}),
            None => json!({"user": {"name": "nobody"}}),
        };
        Mock::given(method("GET"))
            .and(path("/api/auth/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn client(server: &MockServer, browser: Arc<StaticBrowser>) -> ChatClient {
        ChatClient::new(ChatConfig::with_base_url(server.uri()), browser).unwrap()
    }

    #[tokio::test]
    async fn test_consecutive_asks_continue_thread() {
        let server = MockServer::start().await;
        mount_session(&server, Some("tok")).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"conversation_id": null})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse("m1", "first"), "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                json!({"conversation_id": "conv-1", "parent_message_id": "m1"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse("m2", "second"), "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let mut chat = client(&server, Arc::new(StaticBrowser::new("s=1")));
        let first = chat.ask("one", &ThreadOverride::default()).await.unwrap().unwrap();
        assert_eq!(first.text, "first");
        assert_eq!(first.thread.parent_message_id, "m1");

        let second = chat.ask("two", &ThreadOverride::default()).await.unwrap().unwrap();
        assert_eq!(second.text, "second");
        assert_eq!(chat.thread().parent_message_id, "m2");
    }

    #[tokio::test]
    async fn test_unusable_session_sends_nothing() {
        let server = MockServer::start().await;
        mount_session(&server, None).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut chat = client(&server, Arc::new(StaticBrowser::new("")));
        let err = chat.ask("hi", &ThreadOverride::default()).await.unwrap_err();
        assert!(matches!(err, Error::SessionUnusable(_)));

        let chunks: Vec<StreamChunk> = chat
            .ask_stream("hi", &ThreadOverride::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], StreamChunk::Error(msg) if msg.contains("whipper auth")));
    }

    #[tokio::test]
    async fn test_empty_reply_is_none() {
        let server = MockServer::start().await;
        mount_session(&server, Some("tok")).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"data: [DONE]\n\n".to_vec(), "text/event-stream"))
            .mount(&server)
            .await;

        let mut chat = client(&server, Arc::new(StaticBrowser::new("s=1")));
        let before = chat.thread().clone();
        assert!(chat.ask("hi", &ThreadOverride::default()).await.unwrap().is_none());
        assert_eq!(chat.thread(), &before);
    }

    #[tokio::test]
    async fn test_stalled_reply_is_none() {
        let first_event = format!(
            "data: {}\n\n",
            json!({
                "message": {
                    "id": "m1",
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "parts": ["The answer is: par"]},
                },
                "conversation_id": "conv-1",
            })
        );
        let base = crate::transport::testing::stalling_server(first_event).await;
        let mut config = ChatConfig::with_base_url(base);
        config.timeout_secs = 1;

        let mut chat = ChatClient::new(config, Arc::new(StaticBrowser::new("s=1"))).unwrap();
        let before = chat.thread().clone();
        let reply = chat.ask("hi", &ThreadOverride::default()).await.unwrap();
        assert!(reply.is_none());
        assert_eq!(chat.thread(), &before);
    }

    #[tokio::test]
    async fn test_reset_relaunches_and_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "tok"})))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse("m1", "ok"), "text/event-stream"))
            .mount(&server)
            .await;

        let browser = Arc::new(StaticBrowser::new("s=1"));
        let mut chat = client(&server, browser.clone());
        chat.ask("a", &ThreadOverride::default()).await.unwrap();
        chat.reset().await.unwrap();
        assert_eq!(browser.relaunch_count(), 1);
        assert!(chat.thread().conversation_id.is_none());
        chat.ask("b", &ThreadOverride::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_slot_connects_once() {
        let slot: ClientSlot<u32> = ClientSlot::new();
        let connects = AtomicUsize::new(0);

        let first = slot
            .get_or_connect(|| async {
                connects.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
            .unwrap();
        let second = slot
            .get_or_connect(|| async {
                connects.fetch_add(1, Ordering::SeqCst);
                Ok(8)
            })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second.lock().await, 7);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_failed_connect_leaves_slot_empty() {
        let slot: ClientSlot<u32> = ClientSlot::new();
        let err = slot
            .get_or_connect(|| async { Err(Error::Browser("no chrome".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Browser(_)));
        assert!(slot.get().is_none());

        let value = slot.get_or_connect(|| async { Ok(1) }).await.unwrap();
        assert_eq!(*value.lock().await, 1);
    }
}

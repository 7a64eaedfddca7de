//! Streaming transport for the conversation endpoint.
//!
//! One call sends one user turn and turns the server-sent snapshots of the
//! reply into incremental text chunks. The stream always finishes with
//! `StreamChunk::Done`, which hands back the thread as updated by the call.

use futures::Stream;
use reqwest::Client;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use whipper_browser::BrowserIdentity;

use crate::config::ChatConfig;
use crate::thread::ConversationThread;
use crate::types::{ConversationRequest, StreamEvent};

/// A single streamed piece of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Token(String),
    /// Terminal failure of the call; tokens already yielded stand.
    Error(String),
    Done { thread: ConversationThread },
}

// ---------------------------------------------------------------------------
// SSE framing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Splits a byte stream into `data:` blocks separated by blank lines.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every block completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            frames.extend(parse_block(&block[..pos]));
        }
        frames
    }

    /// Flush a trailing block the server did not terminate.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let block = std::mem::take(&mut self.buffer);
        parse_block(&block).into_iter().collect()
    }
}

fn parse_block(block: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(block);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        return None;
    }

    let data = lines.join("\n");
    if data.trim() == "[DONE]" {
        Some(SseFrame::Done)
    } else {
        Some(SseFrame::Data(data))
    }
}

// ---------------------------------------------------------------------------
// Snapshot reassembly
// ---------------------------------------------------------------------------

/// Turns cumulative reply snapshots into suffix deltas.
#[derive(Debug, Default)]
pub struct SnapshotAssembler {
    previous: String,
}

impl SnapshotAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The text added since the previous snapshot, or `None` when the new
    /// snapshot does not extend the previous one.
    pub fn push(&mut self, full_text: &str) -> Option<String> {
        let delta = full_text.strip_prefix(self.previous.as_str())?.to_string();
        self.previous = full_text.to_string();
        Some(delta)
    }

    pub fn text(&self) -> &str {
        &self.previous
    }
}

// ---------------------------------------------------------------------------
// Conversation call
// ---------------------------------------------------------------------------

/// Send `prompt` on `thread` and stream the reply.
///
/// Ends without any token when no event arrives before the configured
/// timeout, or when the request itself fails. A payload that cannot be
/// decoded, or a reply that stalls for the timeout after its first event,
/// ends the call with one `StreamChunk::Error`.
pub fn stream_conversation(
    client: Client,
    config: &ChatConfig,
    identity: BrowserIdentity,
    access_token: String,
    prompt: String,
    thread: ConversationThread,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    let url = config.conversation_url();
    let model = config.model.clone();
    let timeout = config.timeout();

    async_stream::stream! {
        let mut thread = thread;
        let payload = ConversationRequest::next(&prompt, &model, &thread);
        let deadline = Instant::now() + timeout;

        debug!("Posting conversation turn to {} (model {})", url, model);

        let mut request = client
            .post(&url)
            .header("Accept", "text/event-stream")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&payload);
        if !identity.cookie_header.is_empty() {
            request = request.header("Cookie", identity.cookie_header.clone());
        }
        if let Some(ua) = &identity.user_agent {
            request = request.header("User-Agent", ua.clone());
        }

        let response = match tokio::time::timeout_at(deadline, request.send()).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!("Conversation request failed: {}", e);
                yield StreamChunk::Done { thread };
                return;
            }
            Err(_) => {
                warn!("No reply within {:?}", timeout);
                yield StreamChunk::Done { thread };
                return;
            }
        };

        if !response.status().is_success() {
            warn!("Conversation endpoint returned {}", response.status());
            yield StreamChunk::Done { thread };
            return;
        }

        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = SseDecoder::new();
        let mut assembler = SnapshotAssembler::new();
        let mut seen_event = false;

        loop {
            let next = if seen_event {
                tokio::time::timeout(timeout, body.next()).await
            } else {
                tokio::time::timeout_at(deadline, body.next()).await
            };

            let (frames, eof) = match next {
                Err(_) if seen_event => {
                    warn!("Reply stalled for {:?}; discarding the call", timeout);
                    yield StreamChunk::Error(format!(
                        "Reply stalled for {}s before the end marker; discarding the call",
                        timeout.as_secs()
                    ));
                    break;
                }
                Err(_) => {
                    warn!("No reply event within {:?}", timeout);
                    break;
                }
                Ok(None) => (decoder.finish(), true),
                Ok(Some(Ok(bytes))) => (decoder.push(&bytes), false),
                Ok(Some(Err(e))) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    break;
                }
            };

            let mut finished = eof;
            for frame in frames {
                let data = match frame {
                    SseFrame::Done => {
                        finished = true;
                        break;
                    }
                    SseFrame::Data(data) => data,
                };
                seen_event = true;

                let event = match StreamEvent::decode(&data) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Undecodable reply payload: {}", e);
                        yield StreamChunk::Error(format!("Failed to decode a response: {}", e));
                        finished = true;
                        break;
                    }
                };

                thread.adopt(&event);
                match assembler.push(&event.full_text) {
                    Some(delta) if !delta.is_empty() => yield StreamChunk::Token(delta),
                    Some(_) => {}
                    None => {
                        warn!(
                            "Reply snapshot does not extend the previous {} characters",
                            assembler.text().len()
                        );
                        yield StreamChunk::Error(
                            "Reply text was rewritten mid-stream; discarding the call".into(),
                        );
                        finished = true;
                        break;
                    }
                }
            }

            if finished {
                break;
            }
        }

        drop(body);
        debug!("Conversation call finished ({} chars)", assembler.text().len());
        yield StreamChunk::Done { thread };
    }
}

//! Chat client for a browser-authenticated conversation endpoint.
//!
//! The driven browser lends its cookies; the session manager turns them into
//! an access token; the transport streams each reply as incremental chunks
//! while the conversation thread chains consecutive turns.

pub mod client;
pub mod config;
pub mod session;
pub mod thread;
pub mod transport;
pub mod types;

pub use client::{global_client, BoxedStream, ChatClient, ClientSlot};
pub use config::ChatConfig;
pub use session::{Session, SessionManager};
pub use thread::{ConversationThread, ThreadOverride};
pub use transport::StreamChunk;
pub use types::*;

//! Batch runtime: drives a prompt over many inputs through one chat client.
//!
//! Results are checkpointed after every row, so an interrupted run resumes at
//! the first unprocessed input. Failed submissions back off, reset the client
//! and retry up to a bounded number of attempts.

pub mod classify;
pub mod executor;
pub mod observer;
pub mod submit;
pub mod types;

pub use executor::BatchExecutor;
pub use observer::{BatchObserver, TracingObserver};
pub use submit::{submit, ChatBackend, RetryPolicy};
pub use types::*;

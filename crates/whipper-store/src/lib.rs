//! Whipper Store: JSON-file persistence for prompts, results and inputs.
//!
//! Every file is rewritten whole through a temporary sibling and a rename, so
//! a crash leaves either the previous or the new contents on disk.

pub mod inputs;
pub mod registry;
pub mod results;
pub mod types;

mod persist;

pub use inputs::InputStore;
pub use registry::PromptRegistry;
pub use results::ResultStore;
pub use types::*;

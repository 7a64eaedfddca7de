//! Whipper Core: shared error type and configuration.

pub mod config;
pub mod error;

pub use config::{DataPaths, WhipperConfig};
pub use error::{Error, Result};

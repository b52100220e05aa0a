//! sal360 Common Utilities
//!
//! Shared infrastructure for all sal360 crates:
//! - Error types and result aliases
//! - Stage timing for pipeline reports
//! - Tracing/logging initialization
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;

//! Errors raised by the data model.

use std::path::PathBuf;

/// Errors that can occur when building or persisting model values.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Cannot allocate {width}x{height}x{channels} buffer")]
    Allocation {
        width: usize,
        height: usize,
        channels: usize,
    },

    #[error("Buffer length {actual} does not match {width}x{height}x{channels}")]
    LengthMismatch {
        width: usize,
        height: usize,
        channels: usize,
        actual: usize,
    },

    #[error("Field of view {fov} deg is outside (0, 180)")]
    InvalidFieldOfView { fov: f64 },

    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid manifest: {message}")]
    ValidationError { message: String },
}

//! Error types shared across sal360 crates.

use std::path::PathBuf;

use sal360_sphere_model::ModelError;

/// Top-level error type for sal360 operations.
#[derive(Debug, thiserror::Error)]
pub enum Sal360Error {
    #[error("Allocation error: {message}")]
    Allocation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Projection error: {message}")]
    Projection { message: String },

    #[error("Saliency model error: {message}")]
    Saliency { message: String },

    #[error("Stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Cannot open media stream: {path}")]
    MediaOpen { path: PathBuf },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using Sal360Error.
pub type Sal360Result<T> = Result<T, Sal360Error>;

impl Sal360Error {
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn projection(msg: impl Into<String>) -> Self {
        Self::Projection {
            message: msg.into(),
        }
    }

    pub fn saliency(msg: impl Into<String>) -> Self {
        Self::Saliency {
            message: msg.into(),
        }
    }

    pub fn stage(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    /// Whether this error aborts a whole `estimate` call rather than one tile.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Allocation { .. }
                | Self::Config { .. }
                | Self::Model(ModelError::Allocation { .. })
                | Self::Model(ModelError::InvalidFieldOfView { .. })
        )
    }

    /// Whether this error means source or destination media could not be opened.
    pub fn is_media_open(&self) -> bool {
        matches!(
            self,
            Self::MediaOpen { .. } | Self::Io(_) | Self::Model(ModelError::IoError { .. })
        )
    }
}

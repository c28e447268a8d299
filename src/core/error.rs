//! Structured error handling for the conversion core
//!
//! One error enum covers the whole crate. Variants carry the context a caller
//! needs to decide what to do: usage errors are rejected before any state is
//! touched, corrupt checkpoints abort a load, and failures coming out of the
//! black-box pipeline stages are tagged with the stage they came from.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias with VcError
pub type Result<T> = std::result::Result<T, VcError>;

/// Main error type for the conversion core
#[derive(Error, Debug, Clone)]
pub enum VcError {
    /// Invalid caller input (empty paths, out-of-range parameters)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Embedder logical name outside the supported set
    #[error("Not supported embedder: {name}")]
    UnsupportedEmbedder { name: String },

    /// Checkpoint contents do not match the expected schema
    #[error("Corrupt checkpoint: {message}")]
    CorruptCheckpoint {
        message: String,
        path: Option<PathBuf>,
    },

    /// A weight file could not be opened or decoded
    #[error("Model loading error in {component}: {message}")]
    ModelLoad {
        message: String,
        component: String,
        path: Option<PathBuf>,
    },

    /// Failure raised inside a pipeline stage
    #[error("Inference error in {stage}: {message}")]
    Inference {
        stage: InferenceStage,
        message: String,
    },

    /// Audio decode/resample/save errors
    #[error("Audio processing error ({operation}): {message}")]
    Audio {
        message: String,
        operation: AudioOperation,
    },

    /// Pretrained asset download failed
    #[error("Transfer error for {url}: {message}")]
    Transfer { url: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// Internal/bug errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: Option<String>,
    },
}

impl VcError {
    /// Shorthand for a validation error on a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        VcError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Shorthand for a corrupt-checkpoint error without a known path
    pub fn corrupt(message: impl Into<String>) -> Self {
        VcError::CorruptCheckpoint {
            message: message.into(),
            path: None,
        }
    }

    /// Error raised while holding a poisoned lock
    pub(crate) fn poisoned(location: &str) -> Self {
        VcError::Internal {
            message: "lock poisoned by a panicked holder".to_string(),
            location: Some(location.to_string()),
        }
    }

    /// Tag an arbitrary error with the pipeline stage it came from
    pub fn at_stage(stage: InferenceStage, err: impl fmt::Display) -> Self {
        VcError::Inference {
            stage,
            message: err.to_string(),
        }
    }

    /// True for errors the caller caused (no retry makes sense)
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            VcError::Validation { .. } | VcError::UnsupportedEmbedder { .. }
        )
    }

    /// Attach a path to corrupt-checkpoint and model-load errors that lack one
    pub fn with_path(self, new_path: impl Into<PathBuf>) -> Self {
        match self {
            VcError::CorruptCheckpoint { message, path: None } => VcError::CorruptCheckpoint {
                message,
                path: Some(new_path.into()),
            },
            VcError::ModelLoad {
                message,
                component,
                path: None,
            } => VcError::ModelLoad {
                message,
                component,
                path: Some(new_path.into()),
            },
            other => other,
        }
    }
}

/// Conversion pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceStage {
    FeatureExtraction,
    IndexRetrieval,
    PitchExtraction,
    Synthesis,
    OutputEncoding,
}

impl fmt::Display for InferenceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceStage::FeatureExtraction => write!(f, "feature extraction"),
            InferenceStage::IndexRetrieval => write!(f, "index retrieval"),
            InferenceStage::PitchExtraction => write!(f, "pitch extraction"),
            InferenceStage::Synthesis => write!(f, "synthesis"),
            InferenceStage::OutputEncoding => write!(f, "output encoding"),
        }
    }
}

/// Audio operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOperation {
    Loading,
    Resampling,
    Saving,
}

impl fmt::Display for AudioOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioOperation::Loading => write!(f, "loading"),
            AudioOperation::Resampling => write!(f, "resampling"),
            AudioOperation::Saving => write!(f, "saving"),
        }
    }
}

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add a simple message context
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VcError::Internal {
            message: format!("{}: {}", f(), e),
            location: None,
        })
    }

    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| VcError::Internal {
            message: format!("{}: {}", msg.into(), e),
            location: None,
        })
    }
}

/// Convert from anyhow::Error
impl From<anyhow::Error> for VcError {
    fn from(err: anyhow::Error) -> Self {
        VcError::Internal {
            message: format!("{:#}", err),
            location: None,
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for VcError {
    fn from(err: std::io::Error) -> Self {
        VcError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

/// Convert from candle_core::Error
impl From<candle_core::Error> for VcError {
    fn from(err: candle_core::Error) -> Self {
        VcError::Internal {
            message: format!("Tensor operation failed: {}", err),
            location: None,
        }
    }
}

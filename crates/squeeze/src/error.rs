use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while compressing a single job
#[derive(Debug, Error)]
pub enum CompressError {
    /// Source is unreadable or its duration could not be determined
    #[error("probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    /// Non-positive duration, target size or bitrate
    #[error("validation failed: {0}")]
    Validation(String),

    /// ffmpeg exited abnormally, could not be spawned, or timed out
    #[error("ffmpeg encoding failed: {message}\nSTDERR:\n{diagnostic}")]
    Encoding { message: String, diagnostic: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompressError {
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CompressError::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn encoding(message: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        CompressError::Encoding {
            message: message.into(),
            diagnostic: diagnostic.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompressError::Io {
            path: path.into(),
            source,
        }
    }

    /// Captured encoder output, if this is an encoding failure
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            CompressError::Encoding { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompressError>;

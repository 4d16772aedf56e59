//! Error type shared by the parser, fetcher and generation pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpgError {
    /// The cached EPG file is not there (fetch never ran or failed)
    #[error("EPG input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document-level XML error, no partial result is returned
    #[error("malformed EPG document at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("download failed after {attempts} attempts: {last}")]
    DownloadFailed { attempts: u32, last: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EpgError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EpgError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EpgError>;

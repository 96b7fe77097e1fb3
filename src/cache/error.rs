use crate::weather::error::FormatError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheIoError {
    #[error("Failed to create cache directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Cache path exists but is not a directory: '{0}'")]
    NotADirectory(PathBuf),

    #[error("Failed to list cache directory '{0}'")]
    DirRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write cache file '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to read cache file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to encode weather data for '{0}'")]
    Encode(PathBuf, #[source] FormatError),

    #[error("Failed to decode cache file '{0}'")]
    Decode(PathBuf, #[source] FormatError),

    // Covers errors joining tokio blocking tasks
    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

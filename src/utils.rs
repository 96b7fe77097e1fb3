use crate::cache::error::CacheIoError;
use chrono::{NaiveDate, Utc};
use log::info;
use std::io;
use std::path::Path;

pub async fn ensure_cache_dir_exists(path: &Path) -> Result<(), CacheIoError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(CacheIoError::NotADirectory(path.to_path_buf()));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating cache directory: {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| CacheIoError::DirCreation(path.to_path_buf(), e))
        }
        Err(e) => Err(CacheIoError::DirCreation(path.to_path_buf(), e)),
    }
}

/// Today's date in UTC, the date stamped into new cache filenames.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

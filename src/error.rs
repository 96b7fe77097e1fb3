use crate::cache::error::CacheIoError;
use crate::recovery::error::ClimateDataError;
use crate::sources::error::DataSourceError;
use crate::types::coordinate::CoordinateError;
use crate::types::report::LocationFailure;
use crate::weather::error::FormatError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClimateError {
    #[error(transparent)]
    Cache(#[from] CacheIoError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Recovery(#[from] ClimateDataError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("Failed to read configuration file '{0}'")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse configuration file '{0}'")]
    ConfigParse(PathBuf, #[source] serde_json::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Climate data could not be resolved for any of the {} requested locations", .0.len())]
    AllLocationsFailed(Vec<LocationFailure>),
}

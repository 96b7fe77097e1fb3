use crate::sources::error::DataSourceError;
use crate::types::coordinate::Coordinate;
use thiserror::Error;

/// Terminal failure for one coordinate after recovery was aborted.
#[derive(Debug, Error)]
#[error("Climate data unavailable for {coordinate} after {attempts} retries")]
pub struct ClimateDataError {
    pub coordinate: Coordinate,
    pub attempts: u32,
    #[source]
    pub last_error: DataSourceError,
}

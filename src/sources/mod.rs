//! Remote data sources: the NSRDB primary client and the NCEI precipitation client.

use crate::sources::error::DataSourceError;
use crate::types::coordinate::Coordinate;
use crate::types::weather_record::{PrecipitationSeries, WeatherRecord};
use async_trait::async_trait;

pub mod error;
pub mod ncei;
pub mod nsrdb;
pub mod rate_limit;

#[cfg(test)]
mod test_server;

/// Source of one year of hourly solar-resource weather for a coordinate.
///
/// One call is one request: implementations never retry and never cache.
#[async_trait]
pub trait PrimarySource: Send + Sync {
    async fn fetch(&self, coordinate: Coordinate, year: i32)
        -> Result<WeatherRecord, DataSourceError>;
}

/// Best-effort precipitation source. Every failure is `None`.
#[async_trait]
pub trait PrecipitationSource: Send + Sync {
    async fn fetch_precipitation(
        &self,
        coordinate: Coordinate,
        year: i32,
    ) -> Option<PrecipitationSeries>;
}

mod cache;
mod climate;
mod config;
mod error;
mod geo;
mod recovery;
mod sources;
mod types;
mod utils;
mod weather;

pub use climate::*;
pub use config::*;
pub use error::ClimateError;

pub use geo::{bounding_box, distance, distance_between, BoundingBox, KM_PER_DEGREE};

pub use types::coordinate::{Coordinate, CoordinateError};
pub use types::report::*;
pub use types::site::{unique_coordinates, Site};
pub use types::weather_record::*;

pub use cache::error::CacheIoError;
pub use cache::filename::{cache_file_name, parse_cache_file_name};
pub use cache::manager::{CacheEntry, CacheManager, NearbyEntry};

pub use sources::error::DataSourceError;
pub use sources::ncei::PrecipitationClient;
pub use sources::nsrdb::NsrdbClient;
pub use sources::rate_limit::RateLimiter;
pub use sources::{PrecipitationSource, PrimarySource};

pub use weather::csv_io::{parse_nsrdb_csv, read_weather_file, write_weather_file};
pub use weather::error::FormatError;
pub use weather::formatter::WeatherFormatter;

pub use recovery::controller::*;
pub use recovery::error::ClimateDataError;
pub use recovery::policy::*;

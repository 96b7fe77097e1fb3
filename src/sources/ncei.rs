//! Best-effort hourly precipitation from the NOAA NCEI Climate Data Online API.
//!
//! Station search uses the `PRECIP_HLY` dataset with the `HPCP` datatype. The
//! closest station within range is downloaded page by page. Any failure along
//! the way is logged and reported as "no precipitation", never as an error.

use crate::config::ClimateConfig;
use crate::geo::{bounding_box, distance_between};
use crate::sources::error::DataSourceError;
use crate::sources::rate_limit::RateLimiter;
use crate::sources::PrecipitationSource;
use crate::types::coordinate::Coordinate;
use crate::types::weather_record::PrecipitationSeries;
use async_trait::async_trait;
use bon::bon;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const NCEI_BASE_URL: &str = "https://www.ncei.noaa.gov/cdo-web/api/v2";
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);

const DATASET_ID: &str = "PRECIP_HLY";
const DATATYPE_ID: &str = "HPCP";
const PAGE_SIZE: u32 = 1000;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
enum EnrichmentError {
    #[error("Request to {0} failed")]
    Network(String, #[source] reqwest::Error),

    #[error("Request to {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Response from {0} was not valid JSON")]
    Decode(String, #[source] reqwest::Error),

    #[error("No HPCP station within {0} km")]
    NoStation(f64),

    #[error("Station {0} reported no HPCP readings")]
    NoData(String),
}

#[derive(Debug, Deserialize)]
struct StationsResponse {
    #[serde(default)]
    results: Vec<StationRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct StationRecord {
    id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    metadata: Option<ResponseMetadata>,
    #[serde(default)]
    results: Vec<DataRecord>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    resultset: ResultSet,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(default)]
    count: u32,
}

#[derive(Debug, Deserialize)]
struct DataRecord {
    date: String,
    value: f64,
}

/// NCEI precipitation client.
///
/// Clones share one [`RateLimiter`], so every request made through any clone
/// respects the same 200 ms spacing.
#[derive(Debug, Clone)]
pub struct PrecipitationClient {
    token: String,
    base_url: String,
    max_station_distance_km: f64,
    http: Client,
    rate_limiter: Arc<RateLimiter>,
}

#[bon]
impl PrecipitationClient {
    #[builder(on(String, into))]
    pub fn new(
        token: String,
        base_url: Option<String>,
        max_station_distance_km: Option<f64>,
        timeout: Option<Duration>,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self, DataSourceError> {
        let http = Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(30)))
            .build()
            .map_err(DataSourceError::ClientBuild)?;
        Ok(Self {
            token,
            base_url: base_url
                .unwrap_or_else(|| NCEI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_station_distance_km: max_station_distance_km.unwrap_or(100.0),
            http,
            rate_limiter: rate_limiter
                .unwrap_or_else(|| Arc::new(RateLimiter::new(MIN_REQUEST_INTERVAL))),
        })
    }

    /// `None` when enrichment is disabled or no token is configured.
    pub fn from_config(config: &ClimateConfig) -> Result<Option<Self>, DataSourceError> {
        if !config.precipitation_enabled {
            return Ok(None);
        }
        let Some(token) = config.ncei_token.as_deref() else {
            info!("No NCEI token configured, precipitation will be zero-filled");
            return Ok(None);
        };
        Self::builder()
            .token(token)
            .max_station_distance_km(config.max_station_distance_km)
            .timeout(config.enrichment_timeout())
            .build()
            .map(Some)
    }
}

impl PrecipitationClient {
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, EnrichmentError> {
        let url = format!("{}{path}", self.base_url);
        self.rate_limiter.acquire().await;

        let response = self
            .http
            .get(&url)
            .header("token", &self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| EnrichmentError::Network(url.clone(), e))?;
        let response = response.error_for_status().map_err(|e| match e.status() {
            Some(status) => EnrichmentError::HttpStatus {
                url: url.clone(),
                status,
                source: e,
            },
            None => EnrichmentError::Network(url.clone(), e),
        })?;
        response
            .json::<T>()
            .await
            .map_err(|e| EnrichmentError::Decode(url, e))
    }

    async fn find_station(&self, coordinate: Coordinate) -> Result<(String, f64), EnrichmentError> {
        let extent = bounding_box(coordinate, self.max_station_distance_km).to_extent();
        let stations: StationsResponse = self
            .get_json(
                "/stations",
                &[
                    ("datasetid", DATASET_ID.to_string()),
                    ("datatypeid", DATATYPE_ID.to_string()),
                    ("extent", extent),
                    ("limit", PAGE_SIZE.to_string()),
                ],
            )
            .await?;

        closest_station(coordinate, &stations.results, self.max_station_distance_km)
            .map(|(station, distance_km)| (station.id.clone(), distance_km))
            .ok_or(EnrichmentError::NoStation(self.max_station_distance_km))
    }

    async fn fetch_readings(
        &self,
        station_id: &str,
        year: i32,
    ) -> Result<Vec<(NaiveDateTime, f64)>, EnrichmentError> {
        let mut readings = Vec::new();
        let mut offset = 1;
        loop {
            let page: DataResponse = self
                .get_json(
                    "/data",
                    &[
                        ("datasetid", DATASET_ID.to_string()),
                        ("datatypeid", DATATYPE_ID.to_string()),
                        ("stationid", station_id.to_string()),
                        ("startdate", format!("{year}-01-01")),
                        ("enddate", format!("{year}-12-31")),
                        ("units", "metric".to_string()),
                        ("limit", PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;
            if page.results.is_empty() {
                break;
            }

            readings.extend(page.results.iter().filter_map(parse_reading));
            let total = page.metadata.map(|m| m.resultset.count).unwrap_or(0);
            match next_offset(offset, total) {
                Some(next) => offset = next,
                None => break,
            }
        }

        if readings.is_empty() {
            return Err(EnrichmentError::NoData(station_id.to_string()));
        }
        Ok(readings)
    }

    async fn try_fetch(
        &self,
        coordinate: Coordinate,
        year: i32,
    ) -> Result<PrecipitationSeries, EnrichmentError> {
        let (station_id, distance_km) = self.find_station(coordinate).await?;
        debug!("Nearest HPCP station for {coordinate}: {station_id} ({distance_km:.1} km)");

        let readings = self.fetch_readings(&station_id, year).await?;
        info!(
            "Fetched {} precipitation readings for {coordinate} from station {station_id}",
            readings.len()
        );
        Ok(PrecipitationSeries {
            station_id,
            readings,
        })
    }
}

#[async_trait]
impl PrecipitationSource for PrecipitationClient {
    async fn fetch_precipitation(
        &self,
        coordinate: Coordinate,
        year: i32,
    ) -> Option<PrecipitationSeries> {
        match self.try_fetch(coordinate, year).await {
            Ok(series) => Some(series),
            Err(e) => {
                warn!("No precipitation for {coordinate} in {year}: {e}");
                None
            }
        }
    }
}

fn closest_station(
    center: Coordinate,
    stations: &[StationRecord],
    max_distance_km: f64,
) -> Option<(&StationRecord, f64)> {
    stations
        .iter()
        .filter_map(|station| {
            let (lat, lon) = (station.latitude?, station.longitude?);
            let distance_km = distance_between(center.latitude(), center.longitude(), lat, lon);
            Some((station, distance_km))
        })
        .filter(|(_, distance_km)| *distance_km <= max_distance_km)
        .min_by_key(|(_, distance_km)| OrderedFloat(*distance_km))
}

/// Next 1-based page offset, or `None` once `total` results have been covered.
fn next_offset(offset: u32, total: u32) -> Option<u32> {
    let next = offset.checked_add(PAGE_SIZE)?;
    (next <= total).then_some(next)
}

fn parse_reading(record: &DataRecord) -> Option<(NaiveDateTime, f64)> {
    match NaiveDateTime::parse_from_str(&record.date, TIMESTAMP_FORMAT) {
        Ok(timestamp) => Some((timestamp, record.value)),
        Err(_) => {
            debug!("Skipping precipitation reading with date '{}'", record.date);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_server::{capture_header, serve};
    use chrono::NaiveDate;
    use tokio::time::Instant;

    fn phoenix() -> Coordinate {
        Coordinate::new(33.45, -111.98).unwrap()
    }

    fn client(base_url: &str) -> PrecipitationClient {
        PrecipitationClient::builder()
            .token("test-token")
            .base_url(base_url.to_string())
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn station(id: &str, latitude: Option<f64>, longitude: Option<f64>) -> StationRecord {
        StationRecord {
            id: id.to_string(),
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_closest_station_within_range() {
        let stations = vec![
            station("far", Some(34.40), Some(-111.98)),
            station("no-location", None, Some(-111.98)),
            station("near", Some(33.50), Some(-112.00)),
            station("nearer-but-unlocated", Some(33.45), None),
        ];
        let (found, distance_km) = closest_station(phoenix(), &stations, 100.0).unwrap();
        assert_eq!(found.id, "near");
        assert!(distance_km < 10.0);

        assert!(closest_station(phoenix(), &stations, 1.0).is_none());
        assert!(closest_station(phoenix(), &[], 100.0).is_none());
    }

    #[test]
    fn test_pagination_offsets() {
        assert_eq!(next_offset(1, 0), None);
        assert_eq!(next_offset(1, 999), None);
        assert_eq!(next_offset(1, 1000), None);
        assert_eq!(next_offset(1, 1001), Some(1001));
        assert_eq!(next_offset(1001, 2500), Some(2001));
        assert_eq!(next_offset(2001, 2500), None);
    }

    #[test]
    fn test_parse_reading() {
        let reading = DataRecord {
            date: "2024-07-15T18:00:00".to_string(),
            value: 2.3,
        };
        assert_eq!(
            parse_reading(&reading),
            Some((
                NaiveDate::from_ymd_opt(2024, 7, 15)
                    .unwrap()
                    .and_hms_opt(18, 0, 0)
                    .unwrap(),
                2.3
            ))
        );
        let bad = DataRecord {
            date: "15/07/2024".to_string(),
            value: 1.0,
        };
        assert_eq!(parse_reading(&bad), None);
    }

    #[tokio::test]
    async fn test_fetches_all_pages_with_rate_limit() {
        let stations = r#"{"results":[
            {"id":"COOP:026481","latitude":33.43,"longitude":-112.00},
            {"id":"COOP:020000","latitude":34.20,"longitude":-111.50}
        ]}"#;
        let first_page = r#"{"metadata":{"resultset":{"offset":1,"count":1500,"limit":1000}},"results":[
            {"date":"2024-01-01T07:00:00","datatype":"HPCP","station":"COOP:026481","value":0.5},
            {"date":"2024-01-01T08:00:00","datatype":"HPCP","station":"COOP:026481","value":1.2}
        ]}"#;
        let second_page = r#"{"metadata":{"resultset":{"offset":1001,"count":1500,"limit":1000}},"results":[
            {"date":"2024-03-02T13:00:00","datatype":"HPCP","station":"COOP:026481","value":0.3}
        ]}"#;
        let (base_url, server) = serve(vec![
            (200, stations.to_string()),
            (200, first_page.to_string()),
            (200, second_page.to_string()),
        ])
        .await;

        let started = Instant::now();
        let series = client(&base_url)
            .fetch_precipitation(phoenix(), 2024)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(400));
        assert_eq!(series.station_id, "COOP:026481");
        assert_eq!(series.readings.len(), 3);

        let targets = server.await.unwrap();
        assert!(targets[0].starts_with("/stations?datasetid=PRECIP_HLY&datatypeid=HPCP&extent="));
        assert!(targets[1].contains("stationid=COOP%3A026481"));
        assert!(targets[1].contains("offset=1"));
        assert!(targets[1].contains("startdate=2024-01-01"));
        assert!(targets[2].contains("offset=1001"));
    }

    #[tokio::test]
    async fn test_sends_token_header() {
        let (base_url, header) = capture_header("token", r#"{"results":[]}"#).await;
        let series = client(&base_url).fetch_precipitation(phoenix(), 2024).await;
        assert!(series.is_none());
        assert_eq!(header.await.unwrap().as_deref(), Some("test-token"));
    }

    #[tokio::test]
    async fn test_empty_data_is_none() {
        let stations = r#"{"results":[{"id":"COOP:026481","latitude":33.43,"longitude":-112.00}]}"#;
        let (base_url, _server) = serve(vec![(200, stations.to_string()), (200, "{}".to_string())]).await;
        assert!(client(&base_url)
            .fetch_precipitation(phoenix(), 2024)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_failures_are_none() {
        let (base_url, _server) = serve(vec![(503, "unavailable".to_string())]).await;
        assert!(client(&base_url)
            .fetch_precipitation(phoenix(), 2024)
            .await
            .is_none());

        let (base_url, _server) = serve(vec![(200, "not json".to_string())]).await;
        assert!(client(&base_url)
            .fetch_precipitation(phoenix(), 2024)
            .await
            .is_none());

        assert!(client("http://127.0.0.1:9")
            .fetch_precipitation(phoenix(), 2024)
            .await
            .is_none());
    }

    #[test]
    fn test_from_config() {
        let mut config = ClimateConfig::default();
        assert!(PrecipitationClient::from_config(&config).unwrap().is_none());

        config.ncei_token = Some("token".to_string());
        assert!(PrecipitationClient::from_config(&config).unwrap().is_some());

        config.precipitation_enabled = false;
        assert!(PrecipitationClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_clones_share_rate_limiter() {
        let shared = client(NCEI_BASE_URL);
        let copy = shared.clone();
        assert!(Arc::ptr_eq(shared.rate_limiter(), copy.rate_limiter()));
        assert_eq!(shared.rate_limiter().min_interval(), MIN_REQUEST_INTERVAL);
    }
}

use crate::config::ClimateConfig;
use crate::sources::error::DataSourceError;
use crate::sources::PrimarySource;
use crate::types::coordinate::Coordinate;
use crate::types::weather_record::WeatherRecord;
use crate::weather::csv_io::parse_nsrdb_csv;
use async_trait::async_trait;
use bon::bon;
use log::{error, info};
use reqwest::Client;
use std::time::Duration;

pub const NSRDB_PSM_URL: &str = "https://developer.nrel.gov/api/nsrdb/v2/solar/psm3-2-2-download.csv";

const WEATHER_ATTRIBUTES: &str = "ghi,dni,dhi,air_temperature,wind_speed,surface_albedo";
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Client for the NREL NSRDB PSM v3.2.2 hourly CSV download.
///
/// Each [`PrimarySource::fetch`] is exactly one HTTP request.
#[derive(Debug, Clone)]
pub struct NsrdbClient {
    api_key: String,
    email: String,
    endpoint: String,
    http: Client,
}

#[bon]
impl NsrdbClient {
    /// Builds a client. `endpoint` defaults to the public PSM v3.2.2 URL and
    /// `timeout` to two minutes.
    #[builder(on(String, into))]
    pub fn new(
        api_key: String,
        email: String,
        endpoint: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, DataSourceError> {
        let http = Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(120)))
            .build()
            .map_err(DataSourceError::ClientBuild)?;
        Ok(Self {
            api_key,
            email,
            endpoint: endpoint.unwrap_or_else(|| NSRDB_PSM_URL.to_string()),
            http,
        })
    }

    pub fn from_config(config: &ClimateConfig) -> Result<Self, DataSourceError> {
        Self::builder()
            .api_key(config.api_key.as_str())
            .email(config.api_email.as_str())
            .timeout(config.request_timeout())
            .build()
    }

    pub(crate) fn request(
        &self,
        coordinate: Coordinate,
        year: i32,
    ) -> Result<reqwest::Request, reqwest::Error> {
        // WKT points are longitude first.
        let wkt = format!(
            "POINT({} {})",
            coordinate.longitude_key(),
            coordinate.latitude_key()
        );
        let year = year.to_string();
        self.http
            .get(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("email", self.email.as_str()),
                ("wkt", wkt.as_str()),
                ("names", year.as_str()),
                ("attributes", WEATHER_ATTRIBUTES),
                ("interval", "60"),
                ("leap_day", "true"),
                ("utc", "false"),
            ])
            .build()
    }
}

#[async_trait]
impl PrimarySource for NsrdbClient {
    async fn fetch(
        &self,
        coordinate: Coordinate,
        year: i32,
    ) -> Result<WeatherRecord, DataSourceError> {
        // The query carries the API key, so errors only ever name the endpoint.
        let url = self.endpoint.clone();
        info!("Fetching NSRDB data for {coordinate}, year {year}");

        let request = self
            .request(coordinate, year)
            .map_err(|e| DataSourceError::NetworkRequest(url.clone(), e))?;
        let response = self.http.execute(request).await.map_err(|e| {
            error!("NSRDB request failed for {coordinate}: {e}");
            DataSourceError::from_transport(&url, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("NSRDB returned HTTP {status} for {coordinate}");
            return Err(DataSourceError::HttpStatus {
                url,
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let payload = response
            .text()
            .await
            .map_err(|e| DataSourceError::from_transport(&url, e))?;
        let record = tokio::task::spawn_blocking(move || parse_nsrdb_csv(&payload, coordinate))
            .await?
            .map_err(|source| {
                error!("NSRDB payload for {coordinate} could not be parsed: {source}");
                DataSourceError::MalformedPayload { url, source }
            })?;

        info!(
            "Retrieved {} hourly NSRDB rows for {coordinate}",
            record.rows.len()
        );
        Ok(record)
    }
}

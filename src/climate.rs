//! This module provides the main entry point for acquiring climate data.
//! It turns a list of sites into one cached, formatted weather file per unique
//! coordinate, fetching, enriching and recovering as needed.

use crate::cache::manager::{CacheEntry, CacheManager};
use crate::config::ClimateConfig;
use crate::error::ClimateError;
use crate::recovery::controller::{RecoveryController, RecoveryOutcome};
use crate::recovery::policy::{AutoPolicy, RecoveryPolicy};
use crate::sources::ncei::PrecipitationClient;
use crate::sources::nsrdb::NsrdbClient;
use crate::sources::{PrecipitationSource, PrimarySource};
use crate::types::coordinate::Coordinate;
use crate::types::report::{ClimateReport, LocationFailure, ResolutionKind, ResolvedLocation};
use crate::types::site::{unique_coordinates, Site};
use crate::types::weather_record::WeatherRecord;
use crate::weather::formatter::WeatherFormatter;
use bon::bon;
use futures_util::stream::{self, StreamExt};
use log::{debug, error, info};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct RunSettings {
    year: i32,
    max_age_days: i64,
    max_distance_km: f64,
}

/// The main struct for acquiring climate data for a set of sites.
///
/// Each unique coordinate is resolved independently:
///
/// 1. a fresh cache file for the exact coordinate is used as is;
/// 2. otherwise the primary source is queried, the result is enriched with
///    precipitation (when available), aligned to a full hourly year and
///    written to the cache;
/// 3. when the primary source fails, a [`RecoveryController`] driven by the
///    configured [`RecoveryPolicy`] retries, substitutes a nearby cache file, or
///    gives up on that coordinate only.
///
/// Create an instance with [`ClimateOrchestrator::from_config`] for the NSRDB and
/// NCEI clients, or with [`ClimateOrchestrator::builder`] to plug in other sources.
///
/// # Examples
///
/// ```rust,no_run
/// # use solar_climate::{AutoPolicy, ClimateConfig, ClimateError, ClimateOrchestrator};
/// # use std::sync::Arc;
/// # async fn run() -> Result<(), ClimateError> {
/// let config = ClimateConfig::default().with_env_overrides();
/// let orchestrator = ClimateOrchestrator::from_config(config, Arc::new(AutoPolicy::RetryFirst))?;
/// # Ok(())
/// # }
/// ```
pub struct ClimateOrchestrator {
    primary: Arc<dyn PrimarySource>,
    precipitation: Option<Arc<dyn PrecipitationSource>>,
    cache: Arc<CacheManager>,
    formatter: WeatherFormatter,
    policy: Arc<dyn RecoveryPolicy>,
    config: ClimateConfig,
}

#[bon]
impl ClimateOrchestrator {
    /// Creates an orchestrator from explicit parts.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.primary(Arc<dyn PrimarySource>)`: **Required.** Source of raw hourly weather.
    /// * `.precipitation(Arc<dyn PrecipitationSource>)`: Optional. Without it the precipitation column is all zeros.
    /// * `.cache(Arc<CacheManager>)`: Optional. Defaults to a [`CacheManager`] over `config.cache_dir`.
    /// * `.policy(Arc<dyn RecoveryPolicy>)`: Optional. Defaults to [`AutoPolicy::RetryFirst`].
    /// * `.config(ClimateConfig)`: Optional. Defaults to [`ClimateConfig::default`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use solar_climate::{ClimateConfig, ClimateOrchestrator, NsrdbClient, DataSourceError};
    /// # use std::sync::Arc;
    /// # fn run() -> Result<(), DataSourceError> {
    /// let config = ClimateConfig::default();
    /// let primary = NsrdbClient::from_config(&config)?;
    /// let orchestrator = ClimateOrchestrator::builder()
    ///     .primary(Arc::new(primary))
    ///     .config(config)
    ///     .build();
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn new(
        primary: Arc<dyn PrimarySource>,
        precipitation: Option<Arc<dyn PrecipitationSource>>,
        cache: Option<Arc<CacheManager>>,
        policy: Option<Arc<dyn RecoveryPolicy>>,
        config: Option<ClimateConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let cache = cache.unwrap_or_else(|| Arc::new(CacheManager::new(config.cache_dir.clone())));
        Self {
            primary,
            precipitation,
            cache,
            formatter: WeatherFormatter::new(),
            policy: policy.unwrap_or_else(|| Arc::new(AutoPolicy::RetryFirst)),
            config,
        }
    }

    /// Creates an orchestrator backed by [`NsrdbClient`] and, when a token is
    /// configured and enrichment is enabled, [`PrecipitationClient`].
    ///
    /// # Errors
    ///
    /// Returns [`ClimateError::DataSource`] if an HTTP client cannot be built.
    pub fn from_config(
        config: ClimateConfig,
        policy: Arc<dyn RecoveryPolicy>,
    ) -> Result<Self, ClimateError> {
        let primary = NsrdbClient::from_config(&config)?;
        let precipitation = PrecipitationClient::from_config(&config)?
            .map(|client| Arc::new(client) as Arc<dyn PrecipitationSource>);
        if precipitation.is_none() {
            info!("Precipitation enrichment disabled; the precipitation column will be zero");
        }
        Ok(Self {
            primary: Arc::new(primary),
            precipitation,
            cache: Arc::new(CacheManager::new(config.cache_dir.clone())),
            formatter: WeatherFormatter::new(),
            policy,
            config,
        })
    }

    pub fn config(&self) -> &ClimateConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Resolves a weather file for every site.
    ///
    /// Sites sharing a coordinate share one file and one primary request. Up to
    /// `max_concurrent_fetches` coordinates are resolved at a time; a coordinate
    /// that cannot be recovered is reported in [`ClimateReport::failures`] while
    /// the others continue.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.sites(&[Site])`: **Required.** Sites in the order they should be reported.
    /// * `.year(i32)`: Optional. Calendar year to fetch. Defaults to `config.default_year`.
    /// * `.max_age_days(i64)`: Optional. Oldest cache file accepted as fresh. Defaults to `config.cache_max_age_days`.
    /// * `.max_cache_distance_km(f64)`: Optional. Search radius for a substitute cache file. Defaults to `config.max_cache_distance_km`.
    ///
    /// # Returns
    ///
    /// A [`ClimateReport`] mapping each resolved coordinate (and through it each site)
    /// to its weather file, plus the per-coordinate failures.
    ///
    /// # Errors
    ///
    /// Returns [`ClimateError::Cache`] if the cache directory cannot be created.
    /// Returns [`ClimateError::AllLocationsFailed`] if at least one coordinate was
    /// requested and none could be resolved.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use solar_climate::{AutoPolicy, ClimateConfig, ClimateError, ClimateOrchestrator, Coordinate, Site};
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), ClimateError> {
    /// let orchestrator =
    ///     ClimateOrchestrator::from_config(ClimateConfig::default(), Arc::new(AutoPolicy::default()))?;
    /// let sites = vec![
    ///     Site::new("phoenix-north", Coordinate::new(33.45, -111.98)?),
    ///     Site::new("tucson", Coordinate::new(32.22, -110.97)?),
    /// ];
    ///
    /// let report = orchestrator
    ///     .fetch_climate_data()
    ///     .sites(&sites)
    ///     .year(2023)
    ///     .call()
    ///     .await?;
    /// for (site, path) in report.site_paths() {
    ///     println!("{} -> {}", site.id, path.display());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn fetch_climate_data(
        &self,
        sites: &[Site],
        year: Option<i32>,
        max_age_days: Option<i64>,
        max_cache_distance_km: Option<f64>,
    ) -> Result<ClimateReport, ClimateError> {
        let settings = RunSettings {
            year: year.unwrap_or(self.config.default_year),
            max_age_days: max_age_days.unwrap_or(self.config.cache_max_age_days),
            max_distance_km: max_cache_distance_km.unwrap_or(self.config.max_cache_distance_km),
        };

        self.cache.ensure_dir().await?;

        let coordinates = unique_coordinates(sites);
        info!(
            "Resolving climate data for {} sites ({} unique locations), year {}",
            sites.len(),
            coordinates.len(),
            settings.year
        );

        let mut outcomes: Vec<_> = stream::iter(coordinates.into_iter().enumerate())
            .map(|(index, coordinate)| async move {
                (index, coordinate, self.resolve(coordinate, settings).await)
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut resolved = Vec::new();
        let mut failures = Vec::new();
        for (_, coordinate, outcome) in outcomes {
            match outcome {
                Ok(location) => resolved.push(location),
                Err(error) => {
                    error!("No climate data for {coordinate}: {error}");
                    failures.push(LocationFailure { coordinate, error });
                }
            }
        }

        if resolved.is_empty() && !failures.is_empty() {
            return Err(ClimateError::AllLocationsFailed(failures));
        }

        let report = ClimateReport::new(sites.to_vec(), resolved, failures);
        let stats = report.stats();
        info!(
            "Climate data: {} locations, {} cache hits, {} fetched, {} recovered by retry, {} nearest fallbacks, {} failed",
            stats.unique_locations,
            stats.cache_hits,
            stats.fetched,
            stats.retried,
            stats.fallbacks,
            stats.failed
        );
        Ok(report)
    }

    async fn resolve(
        &self,
        coordinate: Coordinate,
        settings: RunSettings,
    ) -> Result<ResolvedLocation, ClimateError> {
        let _guard = self.cache.lock_coordinate(coordinate).await;

        if let Some(entry) = self
            .cache
            .lookup_fresh(coordinate, settings.max_age_days)
            .await?
        {
            info!("Cache hit for {coordinate}: {}", entry.path.display());
            return Ok(ResolvedLocation {
                coordinate,
                path: entry.path,
                kind: ResolutionKind::CacheHit,
            });
        }
        info!("Cache miss for {coordinate}, querying primary source");

        let error = match self.primary.fetch(coordinate, settings.year).await {
            Ok(record) => {
                let entry = self
                    .enrich_and_persist(coordinate, record, settings.year)
                    .await?;
                return Ok(ResolvedLocation {
                    coordinate,
                    path: entry.path,
                    kind: ResolutionKind::Fetched,
                });
            }
            Err(error) => error,
        };
        error!("Primary fetch failed for {coordinate}: {error}");

        let nearest = self
            .cache
            .lookup_nearest(coordinate, settings.max_distance_km)
            .await?;
        let outcome = RecoveryController::new(coordinate, error, nearest)
            .with_retry_delay(self.config.retry_delay())
            .run(self.primary.as_ref(), settings.year, self.policy.as_ref())
            .await?;

        match outcome {
            RecoveryOutcome::Fetched { record, retries } => {
                let entry = self
                    .enrich_and_persist(coordinate, record, settings.year)
                    .await?;
                Ok(ResolvedLocation {
                    coordinate,
                    path: entry.path,
                    kind: ResolutionKind::Retried { retries },
                })
            }
            // The substitute file is already formatted, so it is used unchanged.
            RecoveryOutcome::NearestFallback(nearby) => Ok(ResolvedLocation {
                coordinate,
                path: nearby.entry.path,
                kind: ResolutionKind::NearestFallback {
                    source: nearby.entry.coordinate,
                    distance_km: nearby.distance_km,
                },
            }),
        }
    }

    async fn enrich_and_persist(
        &self,
        coordinate: Coordinate,
        record: WeatherRecord,
        year: i32,
    ) -> Result<CacheEntry, ClimateError> {
        let precipitation = match &self.precipitation {
            Some(source) if self.config.precipitation_enabled => {
                source.fetch_precipitation(coordinate, year).await
            }
            _ => None,
        };
        if precipitation.is_none() {
            debug!("No precipitation for {coordinate}; using zeros");
        }

        let formatter = self.formatter;
        let formatted = tokio::task::spawn_blocking(move || {
            formatter.format(&record, precipitation.as_ref(), year)
        })
        .await??;

        Ok(self.cache.persist(coordinate, formatted).await?)
    }
}

use crate::error::ClimateError;
use crate::types::coordinate::Coordinate;
use crate::types::site::Site;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How a coordinate ended up with a weather file.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionKind {
    /// A fresh cache file for the exact coordinate already existed.
    CacheHit,
    /// The primary source answered on the first request.
    Fetched,
    /// The primary source answered on a retry. `retries` includes the successful one.
    Retried { retries: u32 },
    /// A cache file for a nearby coordinate was used instead.
    NearestFallback {
        source: Coordinate,
        distance_km: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub coordinate: Coordinate,
    pub path: PathBuf,
    pub kind: ResolutionKind,
}

#[derive(Debug)]
pub struct LocationFailure {
    pub coordinate: Coordinate,
    pub error: ClimateError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub unique_locations: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub retried: usize,
    pub fallbacks: usize,
    pub failed: usize,
}

/// Result of one `fetch_climate_data` run.
///
/// Locations appear in the order their coordinate was first seen in the site list.
#[derive(Debug)]
pub struct ClimateReport {
    sites: Vec<Site>,
    resolved: Vec<ResolvedLocation>,
    failures: Vec<LocationFailure>,
}

impl ClimateReport {
    pub(crate) fn new(
        sites: Vec<Site>,
        resolved: Vec<ResolvedLocation>,
        failures: Vec<LocationFailure>,
    ) -> Self {
        Self {
            sites,
            resolved,
            failures,
        }
    }

    pub fn resolved(&self) -> &[ResolvedLocation] {
        &self.resolved
    }

    pub fn failures(&self) -> &[LocationFailure] {
        &self.failures
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn path_for(&self, coordinate: Coordinate) -> Option<&Path> {
        self.resolved
            .iter()
            .find(|location| location.coordinate == coordinate)
            .map(|location| location.path.as_path())
    }

    pub fn location_paths(&self) -> HashMap<Coordinate, PathBuf> {
        self.resolved
            .iter()
            .map(|location| (location.coordinate, location.path.clone()))
            .collect()
    }

    /// Path of the weather file for a site id, if its coordinate was resolved.
    pub fn path_for_site(&self, site_id: &str) -> Option<&Path> {
        self.sites
            .iter()
            .find(|site| site.id == site_id)
            .and_then(|site| self.path_for(site.coordinate))
    }

    /// Every site whose coordinate was resolved, paired with its file, in input order.
    pub fn site_paths(&self) -> Vec<(&Site, &Path)> {
        self.sites
            .iter()
            .filter_map(|site| self.path_for(site.coordinate).map(|path| (site, path)))
            .collect()
    }

    pub fn stats(&self) -> FetchStats {
        let mut stats = FetchStats {
            unique_locations: self.resolved.len() + self.failures.len(),
            failed: self.failures.len(),
            ..FetchStats::default()
        };
        for location in &self.resolved {
            match location.kind {
                ResolutionKind::CacheHit => stats.cache_hits += 1,
                ResolutionKind::Fetched => stats.fetched += 1,
                ResolutionKind::Retried { .. } => stats.retried += 1,
                ResolutionKind::NearestFallback { .. } => stats.fallbacks += 1,
            }
        }
        stats
    }
}

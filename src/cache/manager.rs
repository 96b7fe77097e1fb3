use crate::cache::error::CacheIoError;
use crate::cache::filename::{cache_file_name, parse_cache_file_name};
use crate::geo;
use crate::types::coordinate::Coordinate;
use crate::types::weather_record::WeatherRecord;
use crate::utils::{ensure_cache_dir_exists, today};
use crate::weather::csv_io::{read_weather_file, write_weather_file};
use chrono::NaiveDate;
use log::{debug, info};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{hash_map::Entry, HashMap};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A weather file in the cache directory, identified by its filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub coordinate: Coordinate,
    pub fetch_date: NaiveDate,
    pub path: PathBuf,
}

impl CacheEntry {
    pub fn age_days(&self, today: NaiveDate) -> i64 {
        (today - self.fetch_date).num_days()
    }
}

/// A cache entry close to, but not at, the requested coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyEntry {
    pub entry: CacheEntry,
    pub distance_km: f64,
}

/// Owns the flat cache directory of `nsrdb_{lat}_{lon}_{YYYYMMDD}.csv` files.
///
/// Files are never deleted. An expired file is no longer a fresh hit but stays
/// a candidate for [`CacheManager::lookup_nearest`].
pub struct CacheManager {
    cache_dir: PathBuf,
    coordinate_locks: Mutex<HashMap<Coordinate, Arc<Mutex<()>>>>,
}

impl CacheManager {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            coordinate_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub async fn ensure_dir(&self) -> Result<(), CacheIoError> {
        ensure_cache_dir_exists(&self.cache_dir).await
    }

    /// Serializes work on one coordinate. Different coordinates never contend.
    ///
    /// The lock table only keeps coordinates that are held or awaited.
    pub async fn lock_coordinate(&self, coordinate: Coordinate) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.coordinate_locks.lock().await;
            // Only the table references an idle lock, and cloning one needs the table lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            match locks.entry(coordinate) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => entry.insert(Arc::new(Mutex::new(()))).clone(),
            }
        };
        lock.lock_owned().await
    }

    /// Every well-formed cache file, ordered by path. A missing directory is an empty cache.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>, CacheIoError> {
        let mut dir = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheIoError::DirRead(self.cache_dir.clone(), e)),
        };

        let mut entries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheIoError::DirRead(self.cache_dir.clone(), e))?
        {
            let name = item.file_name();
            let Some((coordinate, fetch_date)) = name.to_str().and_then(parse_cache_file_name)
            else {
                continue;
            };
            entries.push(CacheEntry {
                coordinate,
                fetch_date,
                path: item.path(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Newest file for exactly `coordinate`, if it is at most `max_age_days` old.
    pub async fn lookup_fresh(
        &self,
        coordinate: Coordinate,
        max_age_days: i64,
    ) -> Result<Option<CacheEntry>, CacheIoError> {
        self.lookup_fresh_on(coordinate, max_age_days, today()).await
    }

    pub(crate) async fn lookup_fresh_on(
        &self,
        coordinate: Coordinate,
        max_age_days: i64,
        today: NaiveDate,
    ) -> Result<Option<CacheEntry>, CacheIoError> {
        let newest = self
            .entries()
            .await?
            .into_iter()
            .filter(|entry| entry.coordinate == coordinate)
            .max_by_key(|entry| entry.fetch_date);

        match newest {
            Some(entry) if entry.age_days(today) <= max_age_days => {
                debug!("Fresh cache file for {coordinate}: {}", entry.path.display());
                Ok(Some(entry))
            }
            Some(entry) => {
                debug!(
                    "Cache file for {coordinate} is {} days old (limit {max_age_days})",
                    entry.age_days(today)
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Closest cached file within `max_distance_km`, regardless of age.
    ///
    /// Equal distances prefer the most recent fetch date, then path order.
    pub async fn lookup_nearest(
        &self,
        coordinate: Coordinate,
        max_distance_km: f64,
    ) -> Result<Option<NearbyEntry>, CacheIoError> {
        let nearest = self
            .entries()
            .await?
            .into_iter()
            .map(|entry| {
                let distance_km = geo::distance(coordinate, entry.coordinate);
                NearbyEntry { entry, distance_km }
            })
            .filter(|candidate| candidate.distance_km <= max_distance_km)
            .min_by_key(|candidate| {
                (
                    OrderedFloat(candidate.distance_km),
                    Reverse(candidate.entry.fetch_date),
                )
            });
        Ok(nearest)
    }

    /// Writes `record` to today's canonical file for `coordinate`, replacing any
    /// file with the same name.
    pub async fn persist(
        &self,
        coordinate: Coordinate,
        record: WeatherRecord,
    ) -> Result<CacheEntry, CacheIoError> {
        self.persist_on(coordinate, record, today()).await
    }

    pub(crate) async fn persist_on(
        &self,
        coordinate: Coordinate,
        record: WeatherRecord,
        fetch_date: NaiveDate,
    ) -> Result<CacheEntry, CacheIoError> {
        ensure_cache_dir_exists(&self.cache_dir).await?;

        let dir = self.cache_dir.clone();
        let path = dir.join(cache_file_name(coordinate, fetch_date));
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &record)).await??;

        info!("Cached weather for {coordinate} at {}", path.display());
        Ok(CacheEntry {
            coordinate,
            fetch_date,
            path,
        })
    }

    pub async fn load(&self, entry: &CacheEntry) -> Result<WeatherRecord, CacheIoError> {
        let path = entry.path.clone();
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CacheIoError::Read(path.clone(), e))?;
        tokio::task::spawn_blocking(move || {
            read_weather_file(&contents).map_err(|e| CacheIoError::Decode(path, e))
        })
        .await?
    }
}

// Readers only ever see the old file or the complete new one.
fn write_atomically(dir: &Path, path: &Path, record: &WeatherRecord) -> Result<(), CacheIoError> {
    let mut temp =
        NamedTempFile::new_in(dir).map_err(|e| CacheIoError::Write(path.to_path_buf(), e))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write_weather_file(&mut writer, record)
            .map_err(|e| CacheIoError::Encode(path.to_path_buf(), e))?;
        writer
            .flush()
            .map_err(|e| CacheIoError::Write(path.to_path_buf(), e))?;
    }
    temp.persist(path)
        .map_err(|e| CacheIoError::Write(path.to_path_buf(), e.error))?;
    Ok(())
}

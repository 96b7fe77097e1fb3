use crate::cache::manager::NearbyEntry;
use crate::recovery::error::ClimateDataError;
use crate::recovery::policy::RecoveryPolicy;
use crate::sources::error::DataSourceError;
use crate::sources::PrimarySource;
use crate::types::coordinate::Coordinate;
use crate::types::weather_record::WeatherRecord;
use log::{error, info, warn};
use std::time::Duration;

/// Ceiling on failed retries of the primary source for one coordinate.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    NearestFallback,
    Abort,
}

/// Where the controller currently is. Aborting consumes the controller, so it
/// has no state of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Failed,
    Retrying,
    NearestFallback,
}

#[derive(Debug)]
pub enum RecoveryOutcome {
    /// A retry succeeded. `retries` counts every retry made, including the successful one.
    Fetched { record: WeatherRecord, retries: u32 },
    /// A nearby cache file stands in for the coordinate. It is used as is.
    NearestFallback(NearbyEntry),
}

/// What a [`RecoveryPolicy`] sees when asked for the next action.
#[derive(Debug)]
pub struct RecoveryContext<'a> {
    pub coordinate: Coordinate,
    /// Failed retries so far.
    pub attempts: u32,
    pub last_error: &'a DataSourceError,
    pub nearest: Option<&'a NearbyEntry>,
    /// Actions the controller will accept. Always contains [`RecoveryAction::Abort`].
    pub legal: &'a [RecoveryAction],
}

impl RecoveryContext<'_> {
    pub fn is_legal(&self, action: RecoveryAction) -> bool {
        self.legal.contains(&action)
    }

    pub fn retries_left(&self) -> u32 {
        MAX_RETRIES.saturating_sub(self.attempts)
    }
}

/// State machine entered when the primary fetch for a coordinate fails.
///
/// ```text
/// FAILED --retry ok--------> done (fresh record)
/// FAILED --retry failed----> FAILED (attempts + 1, legal while attempts < MAX_RETRIES)
/// FAILED --nearest---------> done (nearby cache file, only if one qualified)
/// FAILED --abort-----------> ClimateDataError
/// ```
#[derive(Debug)]
pub struct RecoveryController {
    coordinate: Coordinate,
    attempts: u32,
    state: RecoveryState,
    last_error: DataSourceError,
    nearest: Option<NearbyEntry>,
    retry_delay: Duration,
}

impl RecoveryController {
    pub fn new(
        coordinate: Coordinate,
        error: DataSourceError,
        nearest: Option<NearbyEntry>,
    ) -> Self {
        Self {
            coordinate,
            attempts: 0,
            state: RecoveryState::Failed,
            last_error: error,
            nearest,
            retry_delay: Duration::ZERO,
        }
    }

    /// Pause before each retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn nearest(&self) -> Option<&NearbyEntry> {
        self.nearest.as_ref()
    }

    pub fn last_error(&self) -> &DataSourceError {
        &self.last_error
    }

    pub fn legal_actions(&self) -> Vec<RecoveryAction> {
        let mut legal = Vec::with_capacity(3);
        if self.attempts < MAX_RETRIES {
            legal.push(RecoveryAction::Retry);
        }
        if self.nearest.is_some() {
            legal.push(RecoveryAction::NearestFallback);
        }
        legal.push(RecoveryAction::Abort);
        legal
    }

    pub fn is_legal(&self, action: RecoveryAction) -> bool {
        self.legal_actions().contains(&action)
    }

    /// Re-invokes the primary source once. Returns `None` without calling the
    /// source when the retry ceiling has been reached.
    pub async fn retry(&mut self, primary: &dyn PrimarySource, year: i32) -> Option<WeatherRecord> {
        if !self.is_legal(RecoveryAction::Retry) {
            warn!(
                "Retry refused for {}: {MAX_RETRIES} retries already failed",
                self.coordinate
            );
            return None;
        }

        self.state = RecoveryState::Retrying;
        if !self.retry_delay.is_zero() {
            tokio::time::sleep(self.retry_delay).await;
        }

        match primary.fetch(self.coordinate, year).await {
            Ok(record) => {
                info!(
                    "Retry {} succeeded for {}",
                    self.attempts + 1,
                    self.coordinate
                );
                Some(record)
            }
            Err(e) => {
                self.attempts += 1;
                warn!(
                    "Retry {}/{MAX_RETRIES} failed for {}: {e}",
                    self.attempts, self.coordinate
                );
                self.last_error = e;
                self.state = RecoveryState::Failed;
                None
            }
        }
    }

    /// The nearby cache entry, if one qualified.
    pub fn take_fallback(&mut self) -> Option<NearbyEntry> {
        let entry = self.nearest.clone()?;
        self.state = RecoveryState::NearestFallback;
        Some(entry)
    }

    pub fn abort(self) -> ClimateDataError {
        ClimateDataError {
            coordinate: self.coordinate,
            attempts: self.attempts,
            last_error: self.last_error,
        }
    }

    /// Drives the state machine with `policy` until it reaches a terminal state.
    ///
    /// When only abort remains legal the policy is not consulted. A choice the
    /// controller does not accept is treated as abort.
    pub async fn run(
        mut self,
        primary: &dyn PrimarySource,
        year: i32,
        policy: &dyn RecoveryPolicy,
    ) -> Result<RecoveryOutcome, ClimateDataError> {
        loop {
            let legal = self.legal_actions();
            if legal == [RecoveryAction::Abort] {
                error!(
                    "No recovery left for {} after {} failed retries",
                    self.coordinate, self.attempts
                );
                return Err(self.abort());
            }

            let choice = policy.choose(&RecoveryContext {
                coordinate: self.coordinate,
                attempts: self.attempts,
                last_error: &self.last_error,
                nearest: self.nearest.as_ref(),
                legal: &legal,
            })
            .await;
            let choice = if legal.contains(&choice) {
                choice
            } else {
                warn!(
                    "Recovery policy chose {choice:?} for {}, which is not allowed; aborting",
                    self.coordinate
                );
                RecoveryAction::Abort
            };

            match choice {
                RecoveryAction::Retry => {
                    if let Some(record) = self.retry(primary, year).await {
                        return Ok(RecoveryOutcome::Fetched {
                            record,
                            retries: self.attempts + 1,
                        });
                    }
                }
                RecoveryAction::NearestFallback => {
                    if let Some(entry) = self.take_fallback() {
                        info!(
                            "Using nearest cache for {}: {} ({:.1} km away)",
                            self.coordinate,
                            entry.entry.path.display(),
                            entry.distance_km
                        );
                        return Ok(RecoveryOutcome::NearestFallback(entry));
                    }
                }
                RecoveryAction::Abort => {
                    error!("Climate data fetch aborted for {}", self.coordinate);
                    return Err(self.abort());
                }
            }
        }
    }
}

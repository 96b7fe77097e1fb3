use crate::types::weather_record::{
    hours_in_year, HourlyWeather, PrecipitationSeries, WeatherRecord,
};
use crate::weather::error::FormatError;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, warn};

/// Aligns raw primary records and optional precipitation onto a complete hourly
/// calendar year.
///
/// Output rows are one per hour from January 1st 00:00 to December 31st 23:00,
/// strictly increasing with no gaps, so 8760 rows (8784 in leap years).
///
/// Alignment rules:
/// * timestamps are floored to the hour and rows outside `year` are dropped;
/// * when two primary rows land in the same hour the first one wins;
/// * hours absent from the primary record get zero irradiance, while
///   temperature, wind speed and albedo repeat the previous present hour
///   (or the first present hour at the start of the year);
/// * the minute offset of the first in-year primary row is kept on every row;
/// * precipitation readings in the same hour are summed and hours without a
///   reading, or a missing series, get `0.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeatherFormatter;

impl WeatherFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(
        &self,
        primary: &WeatherRecord,
        precipitation: Option<&PrecipitationSeries>,
        year: i32,
    ) -> Result<WeatherRecord, FormatError> {
        let start = year_start(year).ok_or(FormatError::NoRowsForYear(year))?;
        let hours = hours_in_year(year);

        let mut slots: Vec<Option<HourlyWeather>> = vec![None; hours];
        let mut minute_offset = None;
        for row in &primary.rows {
            let Some(slot) = hour_slot(row.timestamp, start, year) else {
                continue;
            };
            minute_offset.get_or_insert(row.timestamp.minute());
            slots[slot].get_or_insert(*row);
        }

        let first_present = slots
            .iter()
            .flatten()
            .next()
            .copied()
            .ok_or(FormatError::NoRowsForYear(year))?;
        let minute_offset = Duration::minutes(i64::from(minute_offset.unwrap_or(0)));

        let precipitation = hourly_precipitation(precipitation, start, year, hours);

        let mut filled = 0usize;
        let mut previous = first_present;
        let rows = slots
            .into_iter()
            .enumerate()
            .map(|(hour, slot)| {
                let timestamp = start + Duration::hours(hour as i64) + minute_offset;
                let row = match slot {
                    Some(present) => {
                        previous = present;
                        present
                    }
                    None => {
                        filled += 1;
                        HourlyWeather {
                            ghi: 0.0,
                            dni: 0.0,
                            dhi: 0.0,
                            ..previous
                        }
                    }
                };
                HourlyWeather {
                    timestamp,
                    precipitation: precipitation[hour],
                    ..row
                }
            })
            .collect();

        if filled > 0 {
            warn!("Filled {filled} of {hours} hours missing from the primary data for {year}");
        }

        Ok(WeatherRecord {
            metadata: primary.metadata,
            rows,
        })
    }
}

fn year_start(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn hour_slot(timestamp: NaiveDateTime, start: NaiveDateTime, year: i32) -> Option<usize> {
    if timestamp.year() != year {
        return None;
    }
    usize::try_from((timestamp - start).num_hours()).ok()
}

fn hourly_precipitation(
    series: Option<&PrecipitationSeries>,
    start: NaiveDateTime,
    year: i32,
    hours: usize,
) -> Vec<f64> {
    let mut totals = vec![0.0; hours];
    let Some(series) = series else {
        return totals;
    };

    let mut used = 0usize;
    for (timestamp, value) in &series.readings {
        if let Some(slot) = hour_slot(*timestamp, start, year) {
            totals[slot] += value;
            used += 1;
        }
    }
    debug!(
        "Merged {used} of {} precipitation readings from station {}",
        series.readings.len(),
        series.station_id
    );
    totals
}

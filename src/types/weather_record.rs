use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// One hour of solar-resource weather.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyWeather {
    pub timestamp: NaiveDateTime,
    /// Global horizontal irradiance, W/m².
    pub ghi: f64,
    /// Direct normal irradiance, W/m².
    pub dni: f64,
    /// Diffuse horizontal irradiance, W/m².
    pub dhi: f64,
    /// Air temperature, °C.
    pub temperature: f64,
    /// Wind speed, m/s.
    pub wind_speed: f64,
    /// Surface albedo, 0 to 1.
    pub surface_albedo: f64,
    /// Precipitation, mm. Zero when no enrichment was available.
    pub precipitation: f64,
}

/// Location header reported by the primary source and written to every cache file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationMetadata {
    pub latitude: f64,
    pub longitude: f64,
    /// Offset from UTC in hours.
    pub time_zone: f64,
    /// Metres above sea level.
    pub elevation: f64,
}

/// Hourly weather for a location, either raw from the primary source or
/// aligned to a full calendar year by the formatter.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherRecord {
    pub metadata: LocationMetadata,
    pub rows: Vec<HourlyWeather>,
}

impl WeatherRecord {
    /// True when the rows cover every hour of `year` exactly once, in order.
    pub fn is_complete_year(&self, year: i32) -> bool {
        if self.rows.len() != hours_in_year(year) {
            return false;
        }
        let in_year = self.rows.iter().all(|row| row.timestamp.year() == year);
        let hourly = self
            .rows
            .windows(2)
            .all(|pair| pair[1].timestamp - pair[0].timestamp == chrono::Duration::hours(1));
        in_year && hourly
    }
}

/// Sparse precipitation readings, in millimetres, as reported by a station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecipitationSeries {
    pub station_id: String,
    pub readings: Vec<(NaiveDateTime, f64)>,
}

impl PrecipitationSeries {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// 8784 for leap years, 8760 otherwise.
pub fn hours_in_year(year: i32) -> usize {
    if is_leap_year(year) {
        366 * 24
    } else {
        365 * 24
    }
}

use crate::types::coordinate::{format_hundredths, parse_hundredths, Coordinate};
use chrono::NaiveDate;

const PREFIX: &str = "nsrdb_";
const EXTENSION: &str = ".csv";
const DATE_FORMAT: &str = "%Y%m%d";

/// Canonical cache filename, `nsrdb_{lat}_{lon}_{YYYYMMDD}.csv`.
///
/// ```
/// use chrono::NaiveDate;
/// use solar_climate::{cache_file_name, Coordinate};
///
/// let c = Coordinate::new(33.45, -111.98).unwrap();
/// let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
/// assert_eq!(cache_file_name(c, date), "nsrdb_33.45_-111.98_20240305.csv");
/// ```
pub fn cache_file_name(coordinate: Coordinate, fetch_date: NaiveDate) -> String {
    format!(
        "{PREFIX}{}_{}_{}{EXTENSION}",
        coordinate.latitude_key(),
        coordinate.longitude_key(),
        fetch_date.format(DATE_FORMAT)
    )
}

/// Inverse of [`cache_file_name`]. Returns `None` for anything not in canonical form.
pub fn parse_cache_file_name(name: &str) -> Option<(Coordinate, NaiveDate)> {
    let stem = name.strip_prefix(PREFIX)?.strip_suffix(EXTENSION)?;
    let mut parts = stem.split('_');
    let (lat, lon, date) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let coordinate = Coordinate::from_hundredths(parse_hundredths(lat)?, parse_hundredths(lon)?)?;
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let fetch_date = NaiveDate::from_ymd_opt(
        date[..4].parse().ok()?,
        date[4..6].parse().ok()?,
        date[6..].parse().ok()?,
    )?;

    // Reject aliases like "-0.00" so every accepted name is canonical.
    (cache_file_name(coordinate, fetch_date) == name).then_some((coordinate, fetch_date))
}

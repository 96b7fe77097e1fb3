//! Defines [`Coordinate`], the cache-precision latitude/longitude pair every
//! other component keys on.

use std::fmt;
use thiserror::Error;

const HUNDREDTHS_PER_DEGREE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// A geographic coordinate normalized to two decimal places.
///
/// Two decimal places is the precision of the cache filename, so two inputs that
/// render to the same filename are the same `Coordinate`. The value is stored as
/// integer hundredths of a degree, which makes `Eq` and `Hash` exact.
///
/// # Examples
///
/// ```
/// use solar_climate::Coordinate;
///
/// let a = Coordinate::new(33.4501, -111.98).unwrap();
/// let b = Coordinate::new(33.45, -111.9849).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "(33.45, -111.98)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    lat_e2: i32,
    lon_e2: i32,
}

impl Coordinate {
    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            lat_e2: to_hundredths(latitude),
            lon_e2: to_hundredths(longitude),
        })
    }

    /// Builds a coordinate from hundredths of a degree, as read back from a filename.
    pub(crate) fn from_hundredths(lat_e2: i32, lon_e2: i32) -> Option<Self> {
        let in_range = (-9_000..=9_000).contains(&lat_e2) && (-18_000..=18_000).contains(&lon_e2);
        in_range.then_some(Self { lat_e2, lon_e2 })
    }

    pub fn latitude(&self) -> f64 {
        f64::from(self.lat_e2) / HUNDREDTHS_PER_DEGREE
    }

    pub fn longitude(&self) -> f64 {
        f64::from(self.lon_e2) / HUNDREDTHS_PER_DEGREE
    }

    /// Latitude rendered at fixed two-decimal precision, e.g. `-33.45`.
    pub fn latitude_key(&self) -> String {
        format_hundredths(self.lat_e2)
    }

    /// Longitude rendered at fixed two-decimal precision, e.g. `151.20`.
    pub fn longitude_key(&self) -> String {
        format_hundredths(self.lon_e2)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude_key(), self.longitude_key())
    }
}

fn to_hundredths(degrees: f64) -> i32 {
    // Bounds are checked by the caller, so the product always fits.
    (degrees * HUNDREDTHS_PER_DEGREE).round() as i32
}

/// Renders hundredths of a degree as `[-]D.DD`. Zero is never signed.
pub(crate) fn format_hundredths(value: i32) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    format!("{sign}{}.{:02}", magnitude / 100, magnitude % 100)
}

/// Inverse of [`format_hundredths`]: accepts `[-]D+.DD` and nothing else.
pub(crate) fn parse_hundredths(text: &str) -> Option<i32> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, fraction) = digits.split_once('.')?;
    if whole.is_empty()
        || fraction.len() != 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let magnitude = whole
        .parse::<i32>()
        .ok()?
        .checked_mul(100)?
        .checked_add(fraction.parse::<i32>().ok()?)?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_normalizes_to_two_decimals() {
        let a = Coordinate::new(33.451, -111.979).unwrap();
        let b = Coordinate::new(33.45, -111.98).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.latitude(), 33.45);
        assert_eq!(a.longitude(), -111.98);

        let set: HashSet<Coordinate> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_distinct_at_cache_precision() {
        let a = Coordinate::new(33.45, -111.98).unwrap();
        let b = Coordinate::new(33.46, -111.98).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(CoordinateError::LatitudeOutOfRange(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.01),
            Err(CoordinateError::LongitudeOutOfRange(-180.01))
        );
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn test_keys_have_fixed_precision() {
        let c = Coordinate::new(-33.4, 151.2).unwrap();
        assert_eq!(c.latitude_key(), "-33.40");
        assert_eq!(c.longitude_key(), "151.20");

        // -0.001 rounds to zero and must not keep its sign.
        let near_zero = Coordinate::new(-0.001, 0.004).unwrap();
        assert_eq!(near_zero.latitude_key(), "0.00");
        assert_eq!(near_zero.longitude_key(), "0.00");

        let small_negative = Coordinate::new(-0.05, -0.5).unwrap();
        assert_eq!(small_negative.latitude_key(), "-0.05");
        assert_eq!(small_negative.longitude_key(), "-0.50");
    }

    #[test]
    fn test_parse_hundredths() {
        assert_eq!(parse_hundredths("33.45"), Some(3345));
        assert_eq!(parse_hundredths("-111.98"), Some(-11198));
        assert_eq!(parse_hundredths("0.00"), Some(0));
        assert_eq!(parse_hundredths("+33.45"), None);
        assert_eq!(parse_hundredths("33.4"), None);
        assert_eq!(parse_hundredths("33.456"), None);
        assert_eq!(parse_hundredths(".45"), None);
        assert_eq!(parse_hundredths("33"), None);
        assert_eq!(parse_hundredths("3a.45"), None);
    }
}

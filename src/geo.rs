//! Great-circle helpers shared by the cache and the precipitation station search.

use crate::types::coordinate::Coordinate;
use haversine::{Location as HaversineLocation, Units};

/// Kilometres per degree of latitude, used to turn a search radius into a degree box.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Haversine distance in kilometres between two coordinates (Earth radius 6371 km).
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    distance_between(a.latitude(), a.longitude(), b.latitude(), b.longitude())
}

/// [`distance`] over raw degrees, for points that are not cache coordinates
/// such as weather stations.
pub fn distance_between(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let start = HaversineLocation {
        latitude: lat1,
        longitude: lon1,
    };
    let end = HaversineLocation {
        latitude: lat2,
        longitude: lon2,
    };
    haversine::distance(start, end, Units::Kilometers)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// `minLat,minLon,maxLat,maxLon` with four decimals, the NCEI `extent` format.
    pub fn to_extent(&self) -> String {
        format!(
            "{:.4},{:.4},{:.4},{:.4}",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

/// Square box of `radius_km / 111` degrees around `center`.
pub fn bounding_box(center: Coordinate, radius_km: f64) -> BoundingBox {
    let offset = radius_km / KM_PER_DEGREE;
    BoundingBox {
        min_lat: center.latitude() - offset,
        min_lon: center.longitude() - offset,
        max_lat: center.latitude() + offset,
        max_lon: center.longitude() + offset,
    }
}

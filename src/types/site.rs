use crate::types::coordinate::Coordinate;
use std::collections::HashSet;

/// A named location that needs a weather file, e.g. a planned installation.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: String,
    pub coordinate: Coordinate,
}

impl Site {
    pub fn new(id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            coordinate,
        }
    }
}

/// Collapses sites onto their distinct coordinates, keeping first-seen order.
pub fn unique_coordinates(sites: &[Site]) -> Vec<Coordinate> {
    let mut seen = HashSet::with_capacity(sites.len());
    sites
        .iter()
        .map(|site| site.coordinate)
        .filter(|coordinate| seen.insert(*coordinate))
        .collect()
}

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::spatial::{calculate_distance_to_nearest, SpatialIndex};

/// Column order shared by training and inference.
pub const FEATURE_COLUMNS: [&str; 4] = [
    "latitude",
    "longitude",
    "dist_to_nearest_place",
    "dist_to_nearest_traffic",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub latitude: f64,
    pub longitude: f64,
    /// Kilometres, or 999 without a places index.
    pub dist_to_nearest_place: f64,
    /// Kilometres, or 999 without a traffic index.
    pub dist_to_nearest_traffic: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_COLUMNS`] order.
    pub fn as_row(&self) -> [f64; 4] {
        [
            self.latitude,
            self.longitude,
            self.dist_to_nearest_place,
            self.dist_to_nearest_traffic,
        ]
    }

    /// The two distance features used for clustering.
    pub fn distances(&self) -> [f64; 2] {
        [self.dist_to_nearest_place, self.dist_to_nearest_traffic]
    }
}

pub fn feature_column_names() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|name| name.to_string()).collect()
}

/// Derives feature vectors from the place and traffic indices.
#[derive(Clone, Copy)]
pub struct FeatureExtractor<'a> {
    places: Option<&'a SpatialIndex>,
    traffic: Option<&'a SpatialIndex>,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(places: Option<&'a SpatialIndex>, traffic: Option<&'a SpatialIndex>) -> Self {
        FeatureExtractor { places, traffic }
    }

    pub fn extract(&self, point: Point) -> FeatureVector {
        let (lat, lon) = (point.y(), point.x());
        FeatureVector {
            latitude: lat,
            longitude: lon,
            dist_to_nearest_place: calculate_distance_to_nearest(lat, lon, self.places),
            dist_to_nearest_traffic: calculate_distance_to_nearest(lat, lon, self.traffic),
        }
    }

    pub fn extract_all(&self, points: impl IntoIterator<Item = Point>) -> Vec<FeatureVector> {
        points.into_iter().map(|point| self.extract(point)).collect()
    }
}

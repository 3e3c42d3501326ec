//! Circle predictions over the loaded place and traffic layers.
//!
//! [`ServiceContext`] is built once at startup and only read afterwards, so
//! any number of requests can share it.

use std::path::Path;

use geo::Point;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::datasets::{self, PointTable, PLACES, TRAFFIC};
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::labeling::Scorer;
use crate::sampling::{sample_circle, DEFAULT_SAMPLE_COUNT};
use crate::spatial::{SpatialIndex, DEGREES_TO_KM};

/// Reported when no named place is close enough.
pub const OPEN_AREA: &str = "Open Area";

/// Furthest a named place may be for a prediction to borrow its name.
pub const PLACE_NAME_RADIUS_KM: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

impl CircleRequest {
    fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(Error::InvalidInput(
                "latitude and longitude must be finite".to_string(),
            ));
        }
        if !self.radius_km.is_finite() || self.radius_km < 0.0 {
            return Err(Error::InvalidInput(format!(
                "radius_km must be a non-negative number, got {}",
                self.radius_km
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub latitude: f64,
    pub longitude: f64,
    pub is_suitable: bool,
    pub suitability_score: f64,
    pub place_name: String,
}

pub struct ServiceContext {
    places: PointTable,
    places_index: Option<SpatialIndex>,
    traffic_index: Option<SpatialIndex>,
    scorer: Box<dyn Scorer>,
    sample_count: usize,
}

impl ServiceContext {
    pub fn new(places: PointTable, traffic: &PointTable, scorer: Box<dyn Scorer>) -> ServiceContext {
        let places_index = SpatialIndex::build(&places);
        let traffic_index = SpatialIndex::build(traffic);
        ServiceContext {
            places,
            places_index,
            traffic_index,
            scorer,
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }

    /// Loads the stored place and traffic tables. Both must exist.
    pub fn load(processed_dir: &Path, scorer: Box<dyn Scorer>) -> Result<ServiceContext> {
        let load_required = |name: &str| {
            let path = datasets::table_path(processed_dir, name);
            if !path.exists() {
                return Err(Error::MissingTable {
                    name: name.to_string(),
                    path,
                });
            }
            datasets::load_table(&path, name)
        };

        let places = load_required(PLACES)?;
        let traffic = load_required(TRAFFIC)?;
        log::info!(
            "Loaded {} places and {} traffic points.",
            places.len(),
            traffic.len()
        );

        Ok(ServiceContext::new(places, &traffic, scorer))
    }

    pub fn with_sample_count(mut self, sample_count: usize) -> ServiceContext {
        self.sample_count = sample_count;
        self
    }

    /// Name of the closest place within [`PLACE_NAME_RADIUS_KM`], or
    /// [`OPEN_AREA`].
    pub fn nearest_place_name(&self, point: Point) -> &str {
        self.places_index
            .as_ref()
            .and_then(|index| index.query_nearest(point.y(), point.x()))
            .filter(|(distance, _)| distance * DEGREES_TO_KM <= PLACE_NAME_RADIUS_KM)
            .and_then(|(_, row)| self.places.get(row))
            .and_then(|record| record.name())
            .unwrap_or(OPEN_AREA)
    }

    /// Scores the given candidate points in order.
    pub fn predict_points(
        &self,
        points: &[Point],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<PredictionResult>> {
        let extractor =
            FeatureExtractor::new(self.places_index.as_ref(), self.traffic_index.as_ref());
        let features = extractor.extract_all(points.iter().copied());
        let assessments = self.scorer.score(&features, rng)?;

        Ok(points
            .iter()
            .zip(assessments)
            .map(|(point, assessment)| PredictionResult {
                latitude: point.y(),
                longitude: point.x(),
                is_suitable: assessment.is_suitable(),
                suitability_score: assessment.suitability_score,
                place_name: self.nearest_place_name(*point).to_string(),
            })
            .collect())
    }

    /// Samples candidates inside the requested circle and scores each one.
    pub fn predict_circle(
        &self,
        request: &CircleRequest,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<PredictionResult>> {
        request.validate()?;
        let points = sample_circle(
            request.latitude,
            request.longitude,
            request.radius_km,
            self.sample_count,
            rng,
        );
        self.predict_points(&points, rng)
    }
}

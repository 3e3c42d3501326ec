//! Nearest-neighbour lookups over a point table.
//!
//! Distances are planar, measured in degrees on the `(latitude, longitude)`
//! plane. Callers turn them into rough kilometres with [`DEGREES_TO_KM`];
//! trained models depend on that exact scale.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::datasets::PointTable;

/// Flat-earth conversion from planar degree distance to kilometres.
pub const DEGREES_TO_KM: f64 = 111.0;

/// Reported distance when there is nothing to measure against.
pub const NO_INDEX_DISTANCE_KM: f64 = 999.0;

/// A table row position stored in the R-tree.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    row: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    /// Bulk-loads an index over the table's coordinates, or `None` for an
    /// empty table.
    pub fn build(table: &PointTable) -> Option<SpatialIndex> {
        if table.is_empty() {
            log::warn!("Table '{}' is empty; no spatial index built.", table.name());
            return None;
        }

        let indexed: Vec<IndexedPoint> = table
            .rows()
            .iter()
            .enumerate()
            .map(|(row, record)| IndexedPoint {
                row,
                lat: record.latitude(),
                lng: record.longitude(),
            })
            .collect();
        log::info!(
            "Built spatial index for '{}' with {} points.",
            table.name(),
            indexed.len()
        );

        Some(SpatialIndex {
            tree: RTree::bulk_load(indexed),
        })
    }

    /// Planar distance to, and table row of, the closest indexed point.
    pub fn query_nearest(&self, lat: f64, lon: f64) -> Option<(f64, usize)> {
        let query = [lat, lon];
        self.tree
            .nearest_neighbor(&query)
            .map(|nearest| (nearest.distance_2(&query).sqrt(), nearest.row))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Approximate kilometres to the nearest indexed point, or
/// [`NO_INDEX_DISTANCE_KM`] when there is no index.
pub fn calculate_distance_to_nearest(lat: f64, lon: f64, index: Option<&SpatialIndex>) -> f64 {
    index
        .and_then(|index| index.query_nearest(lat, lon))
        .map_or(NO_INDEX_DISTANCE_KM, |(distance, _)| {
            distance * DEGREES_TO_KM
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::PointRecord;

    fn table(points: &[(f64, f64)]) -> PointTable {
        PointTable::new(
            "test",
            points
                .iter()
                .map(|&(lat, lon)| PointRecord::new(lat, lon))
                .collect(),
        )
    }

    #[test]
    fn empty_table_has_no_index() {
        assert!(SpatialIndex::build(&table(&[])).is_none());
    }

    #[test]
    fn missing_index_reports_sentinel() {
        for (lat, lon) in [(0.0, 0.0), (12.9, 77.6), (-89.0, 179.0)] {
            assert_eq!(calculate_distance_to_nearest(lat, lon, None), 999.0);
        }
    }

    #[test]
    fn nearest_returns_row_and_planar_distance() {
        let index = SpatialIndex::build(&table(&[(0.0, 0.0), (3.0, 4.0), (10.0, 10.0)])).unwrap();
        assert_eq!(index.len(), 3);

        let (distance, row) = index.query_nearest(3.0, 4.0).unwrap();
        assert_eq!(row, 1);
        assert_eq!(distance, 0.0);

        let (distance, row) = index.query_nearest(0.0, 0.1).unwrap();
        assert_eq!(row, 0);
        assert!((distance - 0.1).abs() < 1e-12);
    }

    #[test]
    fn distance_is_scaled_to_kilometres() {
        let index = SpatialIndex::build(&table(&[(12.90, 77.60)])).unwrap();
        let km = calculate_distance_to_nearest(12.90, 77.61, Some(&index));
        assert!((km - 1.11).abs() < 1e-9);
    }

    #[test]
    fn exact_match_is_zero_and_others_are_positive() {
        let points = [(12.90, 77.60), (12.95, 77.65), (13.0, 77.5)];
        let index = SpatialIndex::build(&table(&points)).unwrap();
        for (lat, lon) in points {
            assert_eq!(calculate_distance_to_nearest(lat, lon, Some(&index)), 0.0);
        }
        for i in 0..50 {
            let offset = i as f64 * 0.013;
            let km = calculate_distance_to_nearest(12.8 + offset, 77.4 + offset, Some(&index));
            assert!(km >= 0.0);
        }
    }
}

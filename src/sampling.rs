use std::f64::consts::TAU;

use geo::Point;
use rand::Rng;

/// Candidate points drawn per prediction request.
pub const DEFAULT_SAMPLE_COUNT: usize = 30;

pub const KM_PER_DEGREE_LAT: f64 = 110.574;
pub const KM_PER_DEGREE_LNG_AT_EQUATOR: f64 = 111.320;

/// Draws `count` points uniformly over the area of a disk.
///
/// The radial distance is `radius_km * sqrt(u)`, which spreads points evenly
/// by area rather than bunching them at the center. Kilometre offsets are
/// turned into degrees with fixed per-degree constants, so the disk is only
/// approximately circular far from the equator.
pub fn sample_circle<R: Rng + ?Sized>(
    center_lat: f64,
    center_lng: f64,
    radius_km: f64,
    count: usize,
    rng: &mut R,
) -> Vec<Point> {
    let km_per_degree_lng = KM_PER_DEGREE_LNG_AT_EQUATOR * center_lat.to_radians().cos();

    (0..count)
        .map(|_| {
            let angle = rng.gen_range(0.0..TAU);
            let r = radius_km * rng.gen_range(0.0..=1.0f64).sqrt();
            let lat_offset = r * angle.cos() / KM_PER_DEGREE_LAT;
            let lng_offset = r * angle.sin() / km_per_degree_lng;
            Point::new(center_lng + lng_offset, center_lat + lat_offset)
        })
        .collect()
}

//! Reduction of arbitrary GeoJSON geometries to one representative point.
//!
//! Points keep their own position. Lines and areas are represented by the
//! arithmetic mean of the vertices of their first ring or line, which is
//! cheap and good enough for proximity features at city scale. It is not an
//! area-weighted centroid.

use geo::Point;
use geojson::{PointType, Value};
use serde_json::Value as JsonValue;

/// Drops unusable vertices from a raw GeoJSON geometry object before it is
/// decoded.
///
/// A vertex is kept only if it is an array whose first two entries are
/// numbers, and it is trimmed to those two. Anything that does not have the
/// nesting its `type` calls for is left alone for the decoder to reject.
pub fn retain_valid_vertices(geometry: &mut JsonValue) {
    let depth = match geometry.get("type").and_then(JsonValue::as_str) {
        Some("Point") => 0,
        Some("LineString" | "MultiPoint") => 1,
        Some("MultiLineString" | "Polygon") => 2,
        Some("MultiPolygon") => 3,
        _ => return,
    };
    if let Some(coordinates) = geometry.get_mut("coordinates") {
        retain_nested(coordinates, depth);
    }
}

fn valid_position(vertex: &JsonValue) -> Option<JsonValue> {
    match vertex.as_array()?.as_slice() {
        [lon, lat, ..] if lon.is_number() && lat.is_number() => {
            Some(JsonValue::Array(vec![lon.clone(), lat.clone()]))
        }
        _ => None,
    }
}

fn retain_nested(value: &mut JsonValue, depth: usize) {
    match (depth, value) {
        (0, value) => {
            if let Some(position) = valid_position(value) {
                *value = position;
            }
        }
        (1, JsonValue::Array(vertices)) => {
            *vertices = vertices.iter().filter_map(valid_position).collect();
        }
        (_, JsonValue::Array(items)) => {
            for item in items {
                retain_nested(item, depth - 1);
            }
        }
        _ => {}
    }
}

/// Reduces a geometry to a single point, with `x` as longitude and `y` as
/// latitude.
///
/// Returns `None` when the geometry type is unsupported, when the selected
/// vertex list is empty, or when no vertex has at least two components.
pub fn reduce(geometry: &Value) -> Option<Point> {
    let point = match geometry {
        Value::Point(position) => position_to_point(position)?,
        Value::LineString(line) => vertex_mean(line)?,
        Value::MultiLineString(lines) => vertex_mean(lines.first()?)?,
        Value::Polygon(rings) => vertex_mean(rings.first()?)?,
        Value::MultiPolygon(polygons) => vertex_mean(polygons.first()?.first()?)?,
        Value::MultiPoint(_) | Value::GeometryCollection(_) => return None,
    };

    if point.x().is_finite() && point.y().is_finite() {
        Some(point)
    } else {
        None
    }
}

fn position_to_point(position: &PointType) -> Option<Point> {
    match position.as_slice() {
        [lon, lat, ..] => Some(Point::new(*lon, *lat)),
        _ => None,
    }
}

fn vertex_mean(vertices: &[PointType]) -> Option<Point> {
    let (count, lon_sum, lat_sum) = vertices
        .iter()
        .filter_map(position_to_point)
        .fold((0usize, 0.0, 0.0), |(count, lon_sum, lat_sum), p| {
            (count + 1, lon_sum + p.x(), lat_sum + p.y())
        });

    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some(Point::new(lon_sum / n, lat_sum / n))
}

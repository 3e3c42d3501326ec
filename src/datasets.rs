use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use geo::Point;
use geojson::Feature;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::geometry;

/// Source categories handled by the preprocessing job, in processing order.
pub const CATEGORIES: [&str; 4] = ["natural", "places", "pois", "traffic"];

pub const PLACES: &str = "places";
pub const TRAFFIC: &str = "traffic";

/// One reduced feature: its representative point plus the source properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub point: Point,
    pub properties: Map<String, Value>,
}

impl PointRecord {
    pub fn new(latitude: f64, longitude: f64) -> PointRecord {
        PointRecord {
            point: Point::new(longitude, latitude),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> PointRecord {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn latitude(&self) -> f64 {
        self.point.y()
    }

    pub fn longitude(&self) -> f64 {
        self.point.x()
    }

    /// The `name` property, if it is a non-blank string.
    pub fn name(&self) -> Option<&str> {
        self.properties
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
    }
}

/// An ordered, named collection of points. Built once and not mutated after.
#[derive(Debug, Clone, PartialEq)]
pub struct PointTable {
    name: String,
    rows: Vec<PointRecord>,
}

impl PointTable {
    pub fn new(name: &str, rows: Vec<PointRecord>) -> PointTable {
        let rows = rows
            .into_iter()
            .filter(|row| row.latitude().is_finite() && row.longitude().is_finite())
            .collect();
        PointTable {
            name: name.to_string(),
            rows,
        }
    }

    pub fn empty(name: &str) -> PointTable {
        PointTable::new(name, vec![])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[PointRecord] {
        &self.rows
    }

    pub fn get(&self, row: usize) -> Option<&PointRecord> {
        self.rows.get(row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Extracts one point per usable feature of a GeoJSON feature collection.
///
/// Features are decoded one at a time, so a malformed feature is logged and
/// skipped without affecting its neighbours.
pub fn collection_points(collection: &Value) -> Vec<PointRecord> {
    let Some(features) = collection.get("features").and_then(Value::as_array) else {
        return vec![];
    };

    features
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| match feature_point(raw) {
            Ok(record) => record,
            Err(reason) => {
                log::debug!("Skipping feature {i}: {reason}");
                None
            }
        })
        .collect()
}

fn feature_point(raw: &Value) -> std::result::Result<Option<PointRecord>, geojson::Error> {
    let mut raw = raw.clone();
    if let Some(shape) = raw.get_mut("geometry") {
        geometry::retain_valid_vertices(shape);
    }
    let feature = Feature::try_from(raw)?;
    let Some(shape) = feature.geometry.as_ref() else {
        return Ok(None);
    };
    let Some(point) = geometry::reduce(&shape.value) else {
        return Ok(None);
    };

    let mut properties = feature.properties.unwrap_or_default();
    properties.remove("latitude");
    properties.remove("longitude");
    Ok(Some(PointRecord { point, properties }))
}

/// Reads a GeoJSON file into a point table.
///
/// A missing file is not an error: it yields an empty table and a warning.
pub fn load_collection_points(path: &Path, name: &str) -> Result<PointTable> {
    if !path.exists() {
        log::warn!("File not found: {}", path.display());
        return Ok(PointTable::empty(name));
    }

    let contents = fs::read_to_string(path)?;
    let collection: Value = serde_json::from_str(&contents)?;
    if !collection.is_object() {
        return Err(Error::GeoJson {
            path: path.to_path_buf(),
            message: "expected a feature collection object".to_string(),
        });
    }

    Ok(PointTable::new(name, collection_points(&collection)))
}

/// Columnar on-disk layout of a point table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ColumnarTable {
    latitude: Vec<f64>,
    longitude: Vec<f64>,
    #[serde(default)]
    columns: BTreeMap<String, Vec<Value>>,
}

impl From<&PointTable> for ColumnarTable {
    fn from(table: &PointTable) -> Self {
        let mut columns: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for key in table.rows.iter().flat_map(|row| row.properties.keys()) {
            columns.entry(key.clone()).or_default();
        }
        for (key, values) in columns.iter_mut() {
            values.extend(
                table
                    .rows
                    .iter()
                    .map(|row| row.properties.get(key).cloned().unwrap_or(Value::Null)),
            );
        }

        ColumnarTable {
            latitude: table.rows.iter().map(PointRecord::latitude).collect(),
            longitude: table.rows.iter().map(PointRecord::longitude).collect(),
            columns,
        }
    }
}

impl ColumnarTable {
    fn into_table(self, name: &str, path: &Path) -> Result<PointTable> {
        let corrupt = |message: String| Error::CorruptTable {
            path: path.to_path_buf(),
            message,
        };

        let len = self.latitude.len();
        if self.longitude.len() != len {
            return Err(corrupt(format!(
                "{} latitudes but {} longitudes",
                len,
                self.longitude.len()
            )));
        }
        if let Some((key, values)) = self.columns.iter().find(|(_, v)| v.len() != len) {
            return Err(corrupt(format!(
                "column '{key}' has {} values, expected {len}",
                values.len()
            )));
        }

        let mut rows: Vec<PointRecord> = self
            .latitude
            .iter()
            .zip(&self.longitude)
            .map(|(&lat, &lon)| PointRecord::new(lat, lon))
            .collect();
        for (key, values) in self.columns {
            for (row, value) in rows.iter_mut().zip(values) {
                if !value.is_null() {
                    row.properties.insert(key.clone(), value);
                }
            }
        }

        Ok(PointTable::new(name, rows))
    }
}

pub fn table_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.table.json"))
}

pub fn save_table(table: &PointTable, path: &Path) -> Result<()> {
    let json = serde_json::to_string(&ColumnarTable::from(table))?;
    fs::write(path, json)?;
    Ok(())
}

pub fn load_table(path: &Path, name: &str) -> Result<PointTable> {
    let contents = fs::read_to_string(path)?;
    let columnar: ColumnarTable = serde_json::from_str(&contents)?;
    columnar.into_table(name, path)
}

/// Loads a stored table, or an empty one (with a warning) if it was never
/// written.
pub fn load_table_or_empty(path: &Path, name: &str) -> Result<PointTable> {
    if path.exists() {
        log::info!("Loading {}...", path.display());
        load_table(path, name)
    } else {
        log::warn!("{} not found. Using an empty table.", path.display());
        Ok(PointTable::empty(name))
    }
}

/// Converts every raw `<category>.geojson` in `raw_dir` into a stored table
/// in `processed_dir`, returning the row count written per category.
///
/// Categories that are missing, unreadable or yield no points are skipped
/// with a warning; the remaining categories are still processed.
pub fn preprocess(raw_dir: &Path, processed_dir: &Path) -> Result<Vec<(String, usize)>> {
    fs::create_dir_all(processed_dir)?;

    let mut written = vec![];
    for category in CATEGORIES {
        let input = raw_dir.join(format!("{category}.geojson"));
        let output = table_path(processed_dir, category);
        log::info!("Processing {} -> {}", input.display(), output.display());

        let table = match load_collection_points(&input, category) {
            Ok(table) => table,
            Err(e) => {
                log::error!("Error processing {}: {e}", input.display());
                PointTable::empty(category)
            }
        };

        if table.is_empty() {
            log::warn!("No data extracted from {}, skipping save.", input.display());
            continue;
        }

        save_table(&table, &output)?;
        log::info!("Saved {} rows to {}", table.len(), output.display());
        written.push((category.to_string(), table.len()));
    }

    Ok(written)
}

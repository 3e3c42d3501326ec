//! Preprocessing, training and loading through the on-disk stores.

use std::{
    fs,
    path::{Path, PathBuf},
};

use rand::{rngs::StdRng, SeedableRng};
use serde_json::{json, Value};
use store_placement::{
    datasets::{self, PLACES, TRAFFIC},
    features::FeatureExtractor,
    labeling::{ClusterDerivedScorer, HeuristicScorer},
    model::{self, ModelArtifact, ModelScorer, FEATURE_COLUMNS_FILE},
    service::{CircleRequest, ServiceContext},
    spatial::SpatialIndex,
    Error,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "store_placement_{name}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn point_feature(lon: f64, lat: f64, name: &str) -> Value {
    json!({
        "type": "Feature",
        "properties": {"name": name},
        "geometry": {"type": "Point", "coordinates": [lon, lat]}
    })
}

fn write_collection(dir: &Path, category: &str, features: Vec<Value>) {
    let collection = json!({"type": "FeatureCollection", "features": features});
    fs::write(
        dir.join(format!("{category}.geojson")),
        serde_json::to_string(&collection).unwrap(),
    )
    .unwrap();
}

/// A dense cluster of places near traffic and a sparse one far from it.
fn write_raw_layers(raw: &Path) {
    let mut places = vec![];
    for i in 0..30 {
        places.push(point_feature(77.60, 12.90 + i as f64 * 0.001, &format!("shop {i}")));
    }
    for i in 0..15 {
        places.push(point_feature(78.10, 13.40 + i as f64 * 0.001, &format!("farm {i}")));
    }
    places.push(json!({
        "type": "Feature",
        "properties": {"name": "park"},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[77.59, 12.89], [77.61, 12.89], [77.61, 12.91], [77.59, 12.91]]]
        }
    }));
    places.push(json!({"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": []}}));
    write_collection(raw, "places", places);

    write_collection(
        raw,
        "traffic",
        vec![json!({
            "type": "Feature",
            "properties": {"highway": "traffic_signals"},
            "geometry": {"type": "LineString", "coordinates": [[77.600, 12.904], [77.602, 12.906]]}
        })],
    );
    // natural and pois are absent
}

#[test]
fn preprocess_writes_tables_for_present_layers() {
    let raw = scratch_dir("pre_raw");
    let processed = scratch_dir("pre_processed");
    write_raw_layers(&raw);

    let written = datasets::preprocess(&raw, &processed).unwrap();
    assert_eq!(
        written,
        vec![(PLACES.to_string(), 46), (TRAFFIC.to_string(), 1)]
    );
    assert!(!datasets::table_path(&processed, "natural").exists());

    let places = datasets::load_table(&datasets::table_path(&processed, PLACES), PLACES).unwrap();
    assert_eq!(places.len(), 46);
    let park = &places.rows()[45];
    assert_eq!(park.name(), Some("park"));
    assert!((park.latitude() - 12.90).abs() < 1e-9);
    assert!((park.longitude() - 77.60).abs() < 1e-9);

    let traffic = datasets::load_table(&datasets::table_path(&processed, TRAFFIC), TRAFFIC).unwrap();
    assert_eq!(traffic.rows()[0].properties["highway"], json!("traffic_signals"));
}

#[test]
fn training_round_trips_through_the_artifact() {
    let raw = scratch_dir("train_raw");
    let processed = scratch_dir("train_processed");
    let model_dir = scratch_dir("train_model");
    write_raw_layers(&raw);
    datasets::preprocess(&raw, &processed).unwrap();

    let outcome = model::run_training(&processed, &model_dir, 42).unwrap();
    assert!(outcome.label_counts.iter().all(|&count| count > 0));

    let loaded = ModelArtifact::load(&model_dir).unwrap();
    assert_eq!(loaded, outcome.artifact);

    let context = ServiceContext::load(&processed, Box::new(ModelScorer::new(loaded))).unwrap();
    let results = context
        .predict_circle(
            &CircleRequest {
                latitude: 12.91,
                longitude: 77.60,
                radius_km: 0.5,
            },
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
    assert_eq!(results.len(), 30);
    assert!(results.iter().all(|r| r.suitability_score <= 0.99));
}

#[test]
fn training_requires_places() {
    let processed = scratch_dir("no_places");
    let err = model::run_training(&processed, &processed.join("model"), 42).unwrap_err();
    assert!(matches!(err, Error::MissingTable { ref name, .. } if name == PLACES));
}

#[test]
fn serving_requires_both_tables() {
    let raw = scratch_dir("serve_raw");
    let processed = scratch_dir("serve_processed");
    write_collection(&raw, "places", vec![point_feature(77.6, 12.9, "a")]);
    datasets::preprocess(&raw, &processed).unwrap();

    let err = ServiceContext::load(
        &processed,
        Box::new(HeuristicScorer::default()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::MissingTable { ref name, .. } if name == TRAFFIC));
}

#[test]
fn reordered_feature_columns_are_rejected() {
    let raw = scratch_dir("mismatch_raw");
    let processed = scratch_dir("mismatch_processed");
    let model_dir = scratch_dir("mismatch_model");
    write_raw_layers(&raw);
    datasets::preprocess(&raw, &processed).unwrap();
    model::run_training(&processed, &model_dir, 42).unwrap();

    fs::write(
        model_dir.join(FEATURE_COLUMNS_FILE),
        r#"["longitude","latitude","dist_to_nearest_place","dist_to_nearest_traffic"]"#,
    )
    .unwrap();
    let err = ModelArtifact::load(&model_dir).unwrap_err();
    assert!(matches!(err, Error::ArtifactMismatch { .. }));
}

#[test]
fn cluster_labels_are_stable_for_a_seed() {
    let raw = scratch_dir("stable_raw");
    let processed = scratch_dir("stable_processed");
    write_raw_layers(&raw);
    datasets::preprocess(&raw, &processed).unwrap();

    let places = datasets::load_table(&datasets::table_path(&processed, PLACES), PLACES).unwrap();
    let traffic = datasets::load_table(&datasets::table_path(&processed, TRAFFIC), TRAFFIC).unwrap();
    let places_index = SpatialIndex::build(&places);
    let traffic_index = SpatialIndex::build(&traffic);
    let features = FeatureExtractor::new(places_index.as_ref(), traffic_index.as_ref())
        .extract_all(places.rows().iter().map(|row| row.point));

    let labeler = ClusterDerivedScorer::new(42);
    let first = labeler.cluster(&features).unwrap();
    for _ in 0..5 {
        assert_eq!(labeler.cluster(&features).unwrap(), first);
    }
}

//! Training job and the persisted classifier.
//!
//! A trained model is stored as two files that only make sense together:
//! the serialized forest and the ordered feature columns it was fit on.

use std::{fs, path::Path};

use rand::RngCore;

use crate::datasets::{self, PointTable, PLACES, TRAFFIC};
use crate::error::{Error, Result};
use crate::features::{feature_column_names, FeatureExtractor, FeatureVector};
use crate::forest::{stratified_split, ClassificationReport, ForestParams, RandomForest};
use crate::labeling::{round3, Assessment, ClusterDerivedScorer, Scorer, MAX_SUITABILITY};
use crate::spatial::SpatialIndex;

pub const MODEL_FILE: &str = "store_placement_model.json";
pub const FEATURE_COLUMNS_FILE: &str = "feature_columns.json";

const TEST_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub model: RandomForest,
    pub feature_columns: Vec<String>,
}

impl ModelArtifact {
    pub fn new(model: RandomForest) -> ModelArtifact {
        ModelArtifact {
            model,
            feature_columns: feature_column_names(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(MODEL_FILE), serde_json::to_string(&self.model)?)?;
        fs::write(
            dir.join(FEATURE_COLUMNS_FILE),
            serde_json::to_string(&self.feature_columns)?,
        )?;
        Ok(())
    }

    /// Loads both halves of the artifact and checks that the stored column
    /// order is the one features are produced in.
    pub fn load(dir: &Path) -> Result<ModelArtifact> {
        let model_path = dir.join(MODEL_FILE);
        let columns_path = dir.join(FEATURE_COLUMNS_FILE);
        if !model_path.exists() || !columns_path.exists() {
            return Err(Error::MissingModel(dir.to_path_buf()));
        }

        let model: RandomForest = serde_json::from_str(&fs::read_to_string(model_path)?)?;
        let feature_columns: Vec<String> =
            serde_json::from_str(&fs::read_to_string(columns_path)?)?;

        let expected = feature_column_names();
        if feature_columns != expected || model.n_features() != expected.len() {
            return Err(Error::ArtifactMismatch {
                expected,
                found: feature_columns,
            });
        }

        Ok(ModelArtifact {
            model,
            feature_columns,
        })
    }

    pub fn predict_proba(&self, features: &FeatureVector) -> f64 {
        self.model.predict_proba(&features.as_row())
    }
}

/// Serves the trained classifier: suitable when most of the forest votes
/// for the suitable cluster.
pub struct ModelScorer {
    artifact: ModelArtifact,
}

impl ModelScorer {
    pub fn new(artifact: ModelArtifact) -> ModelScorer {
        ModelScorer { artifact }
    }
}

impl Scorer for ModelScorer {
    fn score(&self, batch: &[FeatureVector], _rng: &mut dyn RngCore) -> Result<Vec<Assessment>> {
        Ok(batch
            .iter()
            .map(|features| {
                let probability = self.artifact.predict_proba(features);
                Assessment {
                    label: u8::from(probability > 0.5),
                    suitability_score: round3(probability.min(MAX_SUITABILITY)),
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub label_counts: [usize; 2],
    pub report: ClassificationReport,
}

/// Labels every place by clustering its distance features, then fits the
/// classifier on a stratified split and evaluates it on the held-out part.
pub fn train(places: &PointTable, traffic: &PointTable, seed: u64) -> Result<TrainingOutcome> {
    if places.is_empty() {
        return Err(Error::EmptyTrainingSet);
    }

    let places_index = SpatialIndex::build(places);
    let traffic_index = SpatialIndex::build(traffic);
    let extractor = FeatureExtractor::new(places_index.as_ref(), traffic_index.as_ref());

    log::info!("Engineering features for {} points...", places.len());
    let features = extractor.extract_all(places.rows().iter().map(|row| row.point));

    log::info!("Generating labels using k-means clustering...");
    let clustering = ClusterDerivedScorer::new(seed).cluster(&features)?;
    let labels: Vec<u8> = clustering.assignments.iter().map(|&c| c as u8).collect();
    let label_counts = clustering.counts();
    log::info!(
        "Label distribution: 0 -> {}, 1 -> {}",
        label_counts[0],
        label_counts[1]
    );

    let rows: Vec<Vec<f64>> = features.iter().map(|f| f.as_row().to_vec()).collect();
    let (train_idx, test_idx) = stratified_split(&labels, TEST_FRACTION, seed);
    let pick_rows = |idx: &[usize]| -> Vec<Vec<f64>> { idx.iter().map(|&i| rows[i].clone()).collect() };
    let pick_labels = |idx: &[usize]| -> Vec<u8> { idx.iter().map(|&i| labels[i]).collect() };

    let model = RandomForest::fit(
        &pick_rows(&train_idx),
        &pick_labels(&train_idx),
        ForestParams::default(),
        seed,
    );

    let predicted: Vec<u8> = pick_rows(&test_idx)
        .iter()
        .map(|row| model.predict(row))
        .collect();
    let report = ClassificationReport::new(&pick_labels(&test_idx), &predicted);
    log::info!("Model accuracy: {:.2}", report.accuracy);
    log::info!("Hold-out report:\n{report}");

    Ok(TrainingOutcome {
        artifact: ModelArtifact::new(model),
        label_counts,
        report,
    })
}

/// Runs the offline training job from stored tables to a saved artifact.
pub fn run_training(processed_dir: &Path, model_dir: &Path, seed: u64) -> Result<TrainingOutcome> {
    let places_path = datasets::table_path(processed_dir, PLACES);
    let places = if places_path.exists() {
        datasets::load_table(&places_path, PLACES)?
    } else {
        PointTable::empty(PLACES)
    };
    if places.is_empty() {
        return Err(Error::MissingTable {
            name: PLACES.to_string(),
            path: places_path,
        });
    }

    let traffic = datasets::load_table_or_empty(&datasets::table_path(processed_dir, TRAFFIC), TRAFFIC)?;

    let outcome = train(&places, &traffic, seed)?;
    outcome.artifact.save(model_dir)?;
    log::info!("Saved model artifact to {}", model_dir.display());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::PointRecord;
    use rand::{rngs::StdRng, SeedableRng};

    fn places() -> PointTable {
        let mut rows = vec![];
        for i in 0..30 {
            rows.push(PointRecord::new(12.90 + i as f64 * 0.001, 77.60));
        }
        for i in 0..15 {
            rows.push(PointRecord::new(13.40 + i as f64 * 0.001, 78.10));
        }
        PointTable::new(PLACES, rows)
    }

    fn traffic() -> PointTable {
        PointTable::new(TRAFFIC, vec![PointRecord::new(12.905, 77.601)])
    }

    #[test]
    fn training_labels_both_groups() {
        let outcome = train(&places(), &traffic(), 42).unwrap();
        let mut counts = outcome.label_counts;
        counts.sort_unstable();
        assert_eq!(counts, [15, 30]);
        assert_eq!(outcome.artifact.feature_columns, feature_column_names());
        assert!(outcome.report.accuracy > 0.9);
    }

    #[test]
    fn training_without_traffic_is_degenerate() {
        let err = train(&places(), &PointTable::empty(TRAFFIC), 42).unwrap_err();
        assert!(matches!(err, Error::DegenerateClusters { .. }));
    }

    #[test]
    fn training_requires_places() {
        let err = train(&PointTable::empty(PLACES), &traffic(), 42).unwrap_err();
        assert!(matches!(err, Error::EmptyTrainingSet));
    }

    #[test]
    fn model_scorer_reports_bounded_scores() {
        let outcome = train(&places(), &traffic(), 42).unwrap();
        let scorer = ModelScorer::new(outcome.artifact);
        let batch = vec![
            FeatureVector {
                latitude: 12.91,
                longitude: 77.60,
                dist_to_nearest_place: 0.0,
                dist_to_nearest_traffic: 0.5,
            },
            FeatureVector {
                latitude: 13.41,
                longitude: 78.10,
                dist_to_nearest_place: 0.0,
                dist_to_nearest_traffic: 80.0,
            },
        ];
        let assessments = scorer
            .score(&batch, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(assessments.len(), 2);
        assert_ne!(assessments[0].label, assessments[1].label);
        for assessment in assessments {
            assert!((0.0..=MAX_SUITABILITY).contains(&assessment.suitability_score));
        }
    }
}

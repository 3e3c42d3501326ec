//! Strategies that turn feature vectors into suitability labels.
//!
//! [`HeuristicScorer`] is the serving-time rule set. [`ClusterDerivedScorer`]
//! is the offline labeler that synthesises training targets by splitting
//! the distance features into two k-means clusters.

use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    Rng, RngCore, SeedableRng,
};

use crate::error::{Error, Result};
use crate::features::FeatureVector;

/// Label of a location judged suitable.
pub const SUITABLE: u8 = 1;

/// Displayed confidence never reaches 1.0.
pub const MAX_SUITABILITY: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub label: u8,
    /// In `[0, 0.99]`, rounded to three decimals.
    pub suitability_score: f64,
}

impl Assessment {
    pub fn is_suitable(&self) -> bool {
        self.label == SUITABLE
    }
}

/// Assigns a label and a bounded score to each feature vector of a batch.
pub trait Scorer: Send + Sync {
    fn score(&self, batch: &[FeatureVector], rng: &mut dyn RngCore) -> Result<Vec<Assessment>>;
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Distance-threshold rules with a little uniform jitter.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicScorer {
    /// Half-width of the uniform noise added to the raw score.
    pub jitter: f64,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        HeuristicScorer { jitter: 5.0 }
    }
}

impl HeuristicScorer {
    pub const BASE_SCORE: f64 = 50.0;
    pub const SUITABLE_ABOVE: f64 = 65.0;

    /// Score on a 0-100 scale before capping.
    pub fn raw_score(&self, features: &FeatureVector, rng: &mut dyn RngCore) -> f64 {
        let to_place = features.dist_to_nearest_place;
        let to_traffic = features.dist_to_nearest_traffic;

        let mut score = Self::BASE_SCORE;
        if to_traffic < 1.5 {
            score += 35.0;
        }
        if 0.1 < to_place && to_place < 3.0 {
            score += 30.0;
        }
        if to_place > 5.0 {
            score -= 40.0;
        }
        if self.jitter > 0.0 {
            score += rng.gen_range(-self.jitter..=self.jitter);
        }
        score
    }

    pub fn assess(&self, features: &FeatureVector, rng: &mut dyn RngCore) -> Assessment {
        let score = self.raw_score(features, rng);
        Assessment {
            label: u8::from(score > Self::SUITABLE_ABOVE),
            suitability_score: round3((score / 100.0).min(MAX_SUITABILITY)),
        }
    }
}

impl Scorer for HeuristicScorer {
    fn score(&self, batch: &[FeatureVector], rng: &mut dyn RngCore) -> Result<Vec<Assessment>> {
        Ok(batch.iter().map(|features| self.assess(features, rng)).collect())
    }
}

/// Result of a two-way k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub centers: [[f64; 2]; 2],
    pub assignments: Vec<usize>,
}

impl Clustering {
    /// Number of members per cluster.
    pub fn counts(&self) -> [usize; 2] {
        let mut counts = [0; 2];
        for &cluster in &self.assignments {
            counts[cluster] += 1;
        }
        counts
    }
}

fn squared_distance(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

fn nearest_center(point: &[f64; 2], centers: &[[f64; 2]; 2]) -> usize {
    if squared_distance(point, &centers[1]) < squared_distance(point, &centers[0]) {
        1
    } else {
        0
    }
}

/// Two-cluster k-means with k-means++ seeding.
pub fn kmeans2(points: &[[f64; 2]], seed: u64, max_iterations: usize) -> Clustering {
    if points.is_empty() {
        return Clustering {
            centers: [[0.0; 2]; 2],
            assignments: vec![],
        };
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let first = points[rng.gen_range(0..points.len())];
    let weights: Vec<f64> = points.iter().map(|p| squared_distance(p, &first)).collect();
    // All points coincide with the first center when every weight is zero.
    let second = match WeightedIndex::new(&weights) {
        Ok(distribution) => points[distribution.sample(&mut rng)],
        Err(_) => first,
    };

    let mut centers = [first, second];
    let mut assignments = vec![usize::MAX; points.len()];
    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for (assignment, point) in assignments.iter_mut().zip(points) {
            let cluster = nearest_center(point, &centers);
            if *assignment != cluster {
                *assignment = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = [[0.0; 2]; 2];
        let mut counts = [0usize; 2];
        for (&cluster, point) in assignments.iter().zip(points) {
            sums[cluster][0] += point[0];
            sums[cluster][1] += point[1];
            counts[cluster] += 1;
        }
        for cluster in 0..2 {
            if counts[cluster] > 0 {
                let n = counts[cluster] as f64;
                centers[cluster] = [sums[cluster][0] / n, sums[cluster][1] / n];
            }
        }
    }

    Clustering {
        centers,
        assignments,
    }
}

/// Offline labeler: the k-means cluster of the two distance features becomes
/// the label.
///
/// Cluster ids carry no meaning of their own; label 1 is simply the second
/// cluster. The score is how much closer a point sits to its own center
/// than to the other one.
#[derive(Debug, Clone, Copy)]
pub struct ClusterDerivedScorer {
    pub seed: u64,
    pub max_iterations: usize,
}

impl Default for ClusterDerivedScorer {
    fn default() -> Self {
        ClusterDerivedScorer {
            seed: 42,
            max_iterations: 300,
        }
    }
}

impl ClusterDerivedScorer {
    pub fn new(seed: u64) -> Self {
        ClusterDerivedScorer {
            seed,
            ..Default::default()
        }
    }

    /// Fits the clusters, failing unless both clusters are populated.
    pub fn cluster(&self, batch: &[FeatureVector]) -> Result<Clustering> {
        if batch.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }

        let points: Vec<[f64; 2]> = batch.iter().map(FeatureVector::distances).collect();
        let clustering = kmeans2(&points, self.seed, self.max_iterations);

        let distinct = clustering.counts().iter().filter(|&&count| count > 0).count();
        if distinct < 2 {
            return Err(Error::DegenerateClusters { distinct });
        }
        Ok(clustering)
    }
}

impl Scorer for ClusterDerivedScorer {
    fn score(&self, batch: &[FeatureVector], _rng: &mut dyn RngCore) -> Result<Vec<Assessment>> {
        let clustering = self.cluster(batch)?;

        Ok(batch
            .iter()
            .zip(&clustering.assignments)
            .map(|(features, &cluster)| {
                let point = features.distances();
                let own = squared_distance(&point, &clustering.centers[cluster]).sqrt();
                let other = squared_distance(&point, &clustering.centers[1 - cluster]).sqrt();
                let confidence = if own + other > 0.0 {
                    other / (own + other)
                } else {
                    0.5
                };
                Assessment {
                    label: cluster as u8,
                    suitability_score: round3(confidence.min(MAX_SUITABILITY)),
                }
            })
            .collect())
    }
}

//! A small random-forest classifier for binary labels.
//!
//! Trees are CART trees grown on bootstrap samples with Gini impurity and a
//! random subset of candidate features at each split. Nodes are stored flat
//! so a serialized tree never nests deeper than one level.

use std::fmt;

use rand::{rngs::StdRng, seq::index, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Candidate features per split; `None` means the square root of the
    /// feature count.
    pub max_features: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_trees: 100,
            max_depth: 64,
            min_samples_split: 2,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        votes: [u32; 2],
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    params: ForestParams,
    max_features: usize,
    nodes: Vec<Node>,
}

fn votes(labels: &[u8], samples: &[usize]) -> [u32; 2] {
    let mut votes = [0; 2];
    for &sample in samples {
        votes[usize::from(labels[sample] == 1)] += 1;
    }
    votes
}

fn gini(votes: [u32; 2]) -> f64 {
    let total = f64::from(votes[0] + votes[1]);
    if total == 0.0 {
        return 0.0;
    }
    let p = f64::from(votes[1]) / total;
    2.0 * p * (1.0 - p)
}

impl TreeBuilder<'_> {
    fn grow(&mut self, samples: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let node_votes = votes(self.labels, samples);
        let pure = node_votes[0] == 0 || node_votes[1] == 0;
        if pure || depth >= self.params.max_depth || samples.len() < self.params.min_samples_split
        {
            return self.push(Node::Leaf { votes: node_votes });
        }

        let Some((feature, threshold, _)) = self.choose_split(samples, rng) else {
            return self.push(Node::Leaf { votes: node_votes });
        };

        let pivot = partition(samples, |&sample| self.rows[sample][feature] <= threshold);
        let id = self.push(Node::Leaf { votes: node_votes });
        let (left_samples, right_samples) = samples.split_at_mut(pivot);
        let left = self.grow(left_samples, depth + 1, rng);
        let right = self.grow(right_samples, depth + 1, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn choose_split(&self, samples: &[usize], rng: &mut StdRng) -> Option<(usize, f64, f64)> {
        let n_features = self.rows[samples[0]].len();
        let best = index::sample(rng, n_features, self.max_features.min(n_features))
            .into_iter()
            .filter_map(|feature| self.best_split(samples, feature))
            .min_by(|a, b| a.2.total_cmp(&b.2));
        // Keep looking past the sampled features when none of them can split.
        best.or_else(|| {
            (0..n_features)
                .filter_map(|feature| self.best_split(samples, feature))
                .min_by(|a, b| a.2.total_cmp(&b.2))
        })
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Lowest weighted Gini impurity split on one feature, as
    /// `(feature, threshold, impurity)`.
    fn best_split(&self, samples: &[usize], feature: usize) -> Option<(usize, f64, f64)> {
        let mut sorted: Vec<(f64, u8)> = samples
            .iter()
            .map(|&sample| (self.rows[sample][feature], self.labels[sample]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = votes(self.labels, samples);
        let n = sorted.len() as f64;
        let mut left = [0u32; 2];
        let mut best: Option<(usize, f64, f64)> = None;
        for i in 0..sorted.len().saturating_sub(1) {
            left[usize::from(sorted[i].1 == 1)] += 1;
            if sorted[i].0 == sorted[i + 1].0 {
                continue;
            }
            let right = [total[0] - left[0], total[1] - left[1]];
            let n_left = (i + 1) as f64;
            let impurity = (n_left * gini(left) + (n - n_left) * gini(right)) / n;
            if best.map_or(true, |(_, _, b)| impurity < b) {
                let threshold = (sorted[i].0 + sorted[i + 1].0) / 2.0;
                best = Some((feature, threshold, impurity));
            }
        }
        best
    }
}

/// Moves the samples matching `pred` to the front, returning how many there
/// are.
fn partition(samples: &mut [usize], pred: impl Fn(&usize) -> bool) -> usize {
    let mut pivot = 0;
    for i in 0..samples.len() {
        if pred(&samples[i]) {
            samples.swap(pivot, i);
            pivot += 1;
        }
    }
    pivot
}

impl DecisionTree {
    fn fit(
        rows: &[Vec<f64>],
        labels: &[u8],
        samples: &mut [usize],
        params: ForestParams,
        max_features: usize,
        rng: &mut StdRng,
    ) -> DecisionTree {
        let mut builder = TreeBuilder {
            rows,
            labels,
            params,
            max_features,
            nodes: vec![],
        };
        builder.grow(samples, 0, rng);
        DecisionTree {
            nodes: builder.nodes,
        }
    }

    fn votes(&self, row: &[f64]) -> [u32; 2] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { votes } => return *votes,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn probability(&self, row: &[f64]) -> f64 {
        let votes = self.votes(row);
        let total = f64::from(votes[0] + votes[1]);
        if total == 0.0 {
            0.0
        } else {
            f64::from(votes[1]) / total
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits a forest on `rows` (all of equal width) with labels 0 or 1.
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], params: ForestParams, seed: u64) -> RandomForest {
        let n_features = rows.first().map_or(0, Vec::len);
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .max(1);

        let mut rng = StdRng::seed_from_u64(seed);
        let trees = if rows.is_empty() {
            vec![]
        } else {
            (0..params.n_trees)
                .map(|_| {
                    let mut tree_rng = StdRng::seed_from_u64(rng.gen());
                    let mut samples: Vec<usize> = (0..rows.len())
                        .map(|_| tree_rng.gen_range(0..rows.len()))
                        .collect();
                    DecisionTree::fit(rows, labels, &mut samples, params, max_features, &mut tree_rng)
                })
                .collect()
        };

        RandomForest { n_features, trees }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean of the trees' leaf probabilities for label 1.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.probability(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) > 0.5)
    }
}

/// Splits row indices into `(train, test)`, keeping the label proportions
/// in both parts and at least one training row per label.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = vec![];
    let mut test = vec![];
    for label in [0u8, 1] {
        let mut members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == label).collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize).min(members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub classes: [ClassMetrics; 2],
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ClassificationReport {
    pub fn new(truth: &[u8], predicted: &[u8]) -> ClassificationReport {
        let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
        let classes = [0u8, 1].map(|label| {
            let true_positive = truth
                .iter()
                .zip(predicted)
                .filter(|&(&t, &p)| t == label && p == label)
                .count();
            let predicted_positive = predicted.iter().filter(|&&p| p == label).count();
            let support = truth.iter().filter(|&&t| t == label).count();

            let precision = ratio(true_positive, predicted_positive);
            let recall = ratio(true_positive, support);
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            ClassMetrics {
                precision,
                recall,
                f1,
                support,
            }
        });

        ClassificationReport {
            accuracy: ratio(correct, truth.len()),
            classes,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>8} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for (label, metrics) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>8} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, metrics.precision, metrics.recall, metrics.f1, metrics.support
            )?;
        }
        write!(f, "{:>8} {:>29.2}", "accuracy", self.accuracy)
    }
}

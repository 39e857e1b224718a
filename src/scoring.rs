//! Batch anomaly scoring.
//!
//! [`IsolationForest`] isolates rows with random axis-aligned splits; rows
//! that are isolated after few splits are unusual. Reported scores follow the
//! usual decision-function convention: negative means more anomalous than the
//! contamination threshold.

use anyhow::{Result, bail};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::config::ScanConfig;
use crate::data::model::FeatureMatrix;

/// Upper bound on rows drawn per tree.
const MAX_SUBSAMPLE: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Normal,
    Anomalous,
}

/// Model output for one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub label: Label,
    pub score: f64,
}

/// Anything that can label and score a whole feature matrix at once.
pub trait Scorer {
    /// One assessment per matrix row, in row order.
    fn assess(&self, matrix: &FeatureMatrix) -> Result<Vec<Assessment>>;
}

// ---------------------------------------------------------------------------
// Isolation forest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IsolationForest {
    pub n_estimators: usize,
    /// Expected share of anomalous rows, in (0, 1).
    pub contamination: f64,
    pub seed: u64,
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl IsolationForest {
    pub fn new(n_estimators: usize, contamination: f64, seed: u64) -> Self {
        Self {
            n_estimators,
            contamination,
            seed,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.n_estimators, config.anomaly_fraction, config.random_seed)
    }

    /// Raw isolation scores in [-1, 0): `-2^(-E[h] / c(ψ))`, lower is stranger.
    fn raw_scores(&self, rows: &[&[f64]]) -> Vec<f64> {
        let n = rows.len();
        let subsample = n.min(MAX_SUBSAMPLE);
        let height_limit = (subsample as f64).log2().ceil().max(0.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut depth_sums = vec![0.0; n];
        for _ in 0..self.n_estimators {
            let indices = index::sample(&mut rng, n, subsample).into_vec();
            let tree = build_tree(rows, indices, 0, height_limit, &mut rng);
            for (sum, row) in depth_sums.iter_mut().zip(rows) {
                *sum += path_length(&tree, row, 0);
            }
        }

        let normalizer = average_path_length(subsample);
        depth_sums
            .into_iter()
            .map(|sum| {
                let mean_depth = sum / self.n_estimators as f64;
                if normalizer > 0.0 {
                    -(2f64.powf(-mean_depth / normalizer))
                } else {
                    -0.5
                }
            })
            .collect()
    }
}

impl Scorer for IsolationForest {
    fn assess(&self, matrix: &FeatureMatrix) -> Result<Vec<Assessment>> {
        if matrix.is_empty() {
            bail!("cannot score an empty feature matrix");
        }
        if !(self.contamination > 0.0 && self.contamination < 1.0) {
            bail!("contamination must lie in (0, 1), got {}", self.contamination);
        }
        if self.n_estimators == 0 {
            bail!("isolation forest needs at least one tree");
        }

        let rows: Vec<&[f64]> = matrix.rows().iter().map(|r| r.values()).collect();
        let raw = self.raw_scores(&rows);

        let offset = percentile(&raw, self.contamination);
        let scores: Vec<f64> = raw.iter().map(|s| s - offset).collect();

        // The `ceil(contamination * n)` lowest scores are flagged; ties go to
        // the earlier row so the labelling is reproducible.
        let flagged = ((self.contamination * rows.len() as f64) - 1e-9).ceil().max(0.0) as usize;
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]).then(a.cmp(&b)));

        let mut labels = vec![Label::Normal; rows.len()];
        for &i in order.iter().take(flagged) {
            labels[i] = Label::Anomalous;
        }

        log::debug!("Isolation forest offset {offset:.5}, flagged {flagged}");
        Ok(labels
            .into_iter()
            .zip(scores)
            .map(|(label, score)| Assessment { label, score })
            .collect())
    }
}

fn build_tree(
    rows: &[&[f64]],
    indices: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let dimension = rows[indices[0]].len();
    let candidates: Vec<(usize, f64, f64)> = (0..dimension)
        .filter_map(|feature| {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = rows[i][feature];
                (lo.min(v), hi.max(v))
            });
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();
    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let threshold = lo + rng.random::<f64>() * (hi - lo);
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| rows[i][feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(rows, left, depth + 1, height_limit, rng)),
        right: Box::new(build_tree(rows, right, depth + 1, height_limit, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if row[*feature] < *threshold { left } else { right };
            path_length(next, row, depth + 1)
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` items, c(n).
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_GAMMA;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in [0, 1].
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let frac = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

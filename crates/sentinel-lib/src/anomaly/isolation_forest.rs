//! One-dimensional isolation forest
//!
//! Scores follow the usual isolation-forest convention: `score_sample`
//! returns `-2^(-E[h(x)] / c(psi))`, so lower means more anomalous, and the
//! decision offset is the `contamination` quantile of the training scores.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Upper bound on the per-tree subsample size
pub const DEFAULT_MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Forest hyper-parameters
#[derive(Debug, Clone)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    pub max_samples: usize,
    /// Expected outlier fraction, sets the decision offset
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: 0.01,
            seed: 42,
        }
    }
}

/// Binary classification of a scored point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Inlier,
    Outlier,
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Fitted forest; immutable after `fit`
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForest {
    /// Fit a forest over `data`.
    ///
    /// Returns `None` when there are fewer than two points or any value is
    /// not finite, since no meaningful isolation is possible.
    pub fn fit(data: &[f64], params: &IsolationForestParams) -> Option<Self> {
        let n = data.len();
        if n < 2 || data.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let sample_size = params.max_samples.clamp(2, n);
        let depth_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = ChaCha20Rng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators.max(1))
            .map(|_| {
                let subsample: Vec<f64> = index::sample(&mut rng, n, sample_size)
                    .into_iter()
                    .map(|i| data[i])
                    .collect();
                build_node(&subsample, 0, depth_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };

        let mut training_scores: Vec<f64> = data.iter().map(|&x| forest.score_sample(x)).collect();
        forest.offset = percentile(&mut training_scores, params.contamination * 100.0);

        Some(forest)
    }

    /// Negated anomaly score in [-1, 0); lower is more anomalous
    pub fn score_sample(&self, x: f64) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| path_length(tree, x)).sum();
        let mean_depth = total / self.trees.len() as f64;
        let normaliser = average_path_length(self.sample_size);
        if normaliser <= 0.0 {
            return -0.5;
        }
        -(2f64).powf(-mean_depth / normaliser)
    }

    /// Signed distance from the decision boundary; negative means outlier
    pub fn decision_function(&self, x: f64) -> f64 {
        self.score_sample(x) - self.offset
    }

    pub fn predict(&self, x: f64) -> Label {
        if self.decision_function(x) < 0.0 {
            Label::Outlier
        } else {
            Label::Inlier
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

fn build_node(values: &[f64], depth: usize, depth_limit: usize, rng: &mut ChaCha20Rng) -> Node {
    if depth >= depth_limit || values.len() <= 1 {
        return Node::Leaf { size: values.len() };
    }

    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !(max > min) {
        return Node::Leaf { size: values.len() };
    }

    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<f64>, Vec<f64>) = values.iter().copied().partition(|v| *v <= threshold);

    Node::Split {
        threshold,
        left: Box::new(build_node(&left, depth + 1, depth_limit, rng)),
        right: Box::new(build_node(&right, depth + 1, depth_limit, rng)),
    }
}

fn path_length(root: &Node, x: f64) -> f64 {
    let mut node = root;
    let mut depth = 0usize;
    loop {
        match node {
            Node::Leaf { size } => return depth as f64 + average_path_length(*size),
            Node::Split {
                threshold,
                left,
                right,
            } => {
                node = if x <= *threshold { left } else { right };
                depth += 1;
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `p` in [0, 100]
fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    values[lower] + (values[upper] - values[lower]) * weight
}

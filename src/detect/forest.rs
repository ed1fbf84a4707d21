//! Isolation forest over [`FeatureVector`]s.
//!
//! Each tree is grown on a random subsample (without replacement) of the
//! training snapshot. A node picks one of its non-constant features uniformly
//! at random and a split value uniformly inside that feature's range; points
//! `<= split` go left. Growth stops at a single point, at a node where every
//! feature is constant, or at depth `ceil(log2(psi))`.
//!
//! Scores follow the usual normalization: `s(x) = 2^(-E[h(x)] / c(psi))`,
//! reported as `-s(x) - offset` so that lower means more outlying and zero
//! sits at the contamination quantile of the training data.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::detect::{DetectError, FeatureVector, FEATURE_COUNT};

/// Subsample cap per tree, as in the reference algorithm.
pub const MAX_SUBSAMPLE: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Offset used when no contamination fraction is configured.
const DEFAULT_OFFSET: f64 = -0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Fraction of the snapshot drawn for each tree, in (0, 1].
    pub subsample_fraction: f64,
    /// Expected outlier share of the training data; sets the zero point.
    pub contamination: Option<f64>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 150,
            subsample_fraction: 1.0,
            contamination: Some(0.03),
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(points: &mut [FeatureVector], height_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: grow_node(points, 0, height_limit, rng),
        }
    }

    /// Depth at which `x` lands, plus the expected remaining depth of its leaf.
    fn path_length(&self, x: &FeatureVector) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x.get(*feature) <= *threshold { &**left } else { &**right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }

    fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
                Node::Leaf { .. } => 0,
            }
        }
        walk(&self.root)
    }
}

fn grow_node(
    points: &mut [FeatureVector],
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    let leaf = Node::Leaf { size: points.len() };
    if depth >= height_limit || points.len() <= 1 {
        return leaf;
    }

    let mut candidates = [(0usize, 0.0f64, 0.0f64); FEATURE_COUNT];
    let mut n_candidates = 0;
    for feature in 0..FEATURE_COUNT {
        let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.get(feature)), hi.max(p.get(feature)))
        });
        if hi > lo {
            candidates[n_candidates] = (feature, lo, hi);
            n_candidates += 1;
        }
    }
    if n_candidates == 0 {
        return leaf;
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..n_candidates)];
    let threshold = rng.gen_range(lo..hi);

    let mut mid = 0;
    for i in 0..points.len() {
        if points[i].get(feature) <= threshold {
            points.swap(i, mid);
            mid += 1;
        }
    }
    if mid == 0 || mid == points.len() {
        return leaf;
    }

    let (left, right) = points.split_at_mut(mid);
    Node::Split {
        feature,
        threshold,
        left: Box::new(grow_node(left, depth + 1, height_limit, rng)),
        right: Box::new(grow_node(right, depth + 1, height_limit, rng)),
    }
}

/// Expected path length of an unsuccessful search in a binary search tree
/// holding `n` points: `2 H(n-1) - 2 (n-1) / n`.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A trained ensemble. Immutable once built; retraining builds a new one.
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample_size: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn fit(data: &[FeatureVector], params: &ForestParams) -> Result<Self, DetectError> {
        let n = data.len();
        if n == 0 {
            return Err(DetectError::EmptyTrainingSet);
        }

        let wanted = (n as f64 * params.subsample_fraction).round() as usize;
        let subsample_size = wanted.clamp(n.min(2), n).min(MAX_SUBSAMPLE);
        let height_limit = (subsample_size as f64).log2().ceil() as usize;

        let mut master = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(master.gen());
                let mut sample: Vec<FeatureVector> = index::sample(&mut rng, n, subsample_size)
                    .into_iter()
                    .map(|i| data[i])
                    .collect();
                IsolationTree::grow(&mut sample, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            subsample_size,
            offset: DEFAULT_OFFSET,
        };

        if let Some(contamination) = params.contamination {
            let mut train: Vec<f64> = data.iter().map(|x| forest.score_samples(x)).collect();
            train.sort_by(|a, b| a.total_cmp(b));
            forest.offset = percentile(&train, contamination);
        }

        Ok(forest)
    }

    /// Negated normalized isolation score in `[-1, 0]`; lower is more outlying.
    pub fn score_samples(&self, x: &FeatureVector) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.path_length(x)).sum();
        let mean = total / self.trees.len() as f64;
        let norm = average_path_length(self.subsample_size);
        let ratio = if norm > 0.0 { mean / norm } else { 1.0 };
        -(2f64.powf(-ratio))
    }

    /// Score shifted by the training offset; negative means more outlying
    /// than the contamination share of the training snapshot.
    pub fn decision_function(&self, x: &FeatureVector) -> f64 {
        self.score_samples(x) - self.offset
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(IsolationTree::depth).max().unwrap_or(0)
    }
}

/// Linear-interpolated quantile of an ascending slice, `q` in [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return DEFAULT_OFFSET;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal_data(n: usize, seed: u64) -> Vec<FeatureVector> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                FeatureVector::new(
                    120.0 + rng.gen_range(-8.0..8.0),
                    0.2 + rng.gen_range(-0.05..0.05),
                    40.0 + rng.gen_range(-4.0..4.0),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) ~= 10.24
        let c = average_path_length(256);
        assert!((c - 10.24).abs() < 0.01, "c(256) = {}", c);
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), 0.0);
        assert_eq!(percentile(&v, 1.0), 4.0);
        assert!((percentile(&v, 0.1) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_subsample_is_capped() {
        let data = normal_data(400, 1);
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        assert_eq!(forest.subsample_size(), MAX_SUBSAMPLE);
        assert_eq!(forest.n_trees(), 150);
        assert!(forest.max_depth() <= 8);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let data = normal_data(200, 7);
        let params = ForestParams::default();
        let a = IsolationForest::fit(&data, &params).unwrap();
        let b = IsolationForest::fit(&data, &params).unwrap();
        let q = FeatureVector::new(180.0, 0.9, 55.0).unwrap();
        assert_eq!(a.decision_function(&q), b.decision_function(&q));
        assert_eq!(a.offset(), b.offset());
    }

    #[test]
    fn test_outlier_scores_below_center() {
        let data = normal_data(200, 3);
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        let center = FeatureVector::new(120.0, 0.2, 40.0).unwrap();
        let outlier = FeatureVector::new(12_000.0, 20.0, 100.0).unwrap();
        assert!(forest.decision_function(&outlier) < forest.decision_function(&center));
        assert!(forest.decision_function(&outlier) < 0.0);
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let point = FeatureVector::new(100.0, 1.0, 50.0).unwrap();
        let data = vec![point; 64];
        let forest = IsolationForest::fit(&data, &ForestParams::default()).unwrap();
        assert_eq!(forest.max_depth(), 0);
        let far = FeatureVector::new(9_000.0, 50.0, 99.0).unwrap();
        assert_eq!(forest.decision_function(&point), forest.decision_function(&far));
        assert!(forest.decision_function(&point).abs() < 1e-12);
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        let err = IsolationForest::fit(&[], &ForestParams::default()).unwrap_err();
        assert_eq!(err, DetectError::EmptyTrainingSet);
    }
}

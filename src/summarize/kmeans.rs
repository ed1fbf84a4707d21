//! Seeded k-means (k-means++ init, Lloyd iterations, best of `n_init`).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

impl KMeansFit {
    /// Number of points assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (j, c) in centroids.iter().enumerate() {
        let d = sq_dist(point, c);
        if d < best.1 {
            best = (j, d);
        }
    }
    best
}

fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>]) -> Vec<usize> {
    points.iter().map(|p| nearest(p, centroids).0).collect()
}

fn init_plus_plus(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    while centroids.len() < k {
        let d2: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = d2.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, d) in d2.iter().enumerate() {
                if *d > 0.0 && target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[pick].clone());
    }
    centroids
}

/// Mean of each cluster's members. An empty cluster takes the point that is
/// farthest from its own centroid.
fn recompute(points: &[Vec<f64>], labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let k = previous.len();
    let dim = previous.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];
    for (p, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        for (s, x) in sums[label].iter_mut().zip(p) {
            *s += x;
        }
    }

    let mut taken = vec![false; points.len()];
    for j in 0..k {
        if counts[j] > 0 {
            let n = counts[j] as f64;
            sums[j].iter_mut().for_each(|s| *s /= n);
            continue;
        }
        let far = points
            .iter()
            .enumerate()
            .filter(|(i, _)| !taken[*i])
            .map(|(i, p)| (i, sq_dist(p, &previous[labels[i]])))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        match far {
            Some((i, _)) => {
                taken[i] = true;
                sums[j] = points[i].clone();
            }
            None => sums[j] = previous[j].clone(),
        }
    }
    sums
}

fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iter: usize) -> KMeansFit {
    let mut labels = assign(points, &centroids);
    for _ in 0..max_iter {
        centroids = recompute(points, &labels, &centroids);
        let next = assign(points, &centroids);
        if next == labels {
            break;
        }
        labels = next;
    }
    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &l)| sq_dist(p, &centroids[l]))
        .sum();
    KMeansFit {
        labels,
        centroids,
        inertia,
    }
}

/// Cluster `points` into `params.k` groups, keeping the lowest-inertia run.
///
/// `points` must be non-empty and `1 <= k <= points.len()`.
pub fn fit(points: &[Vec<f64>], params: &KMeansParams) -> KMeansFit {
    let k = params.k.clamp(1, points.len().max(1));
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<KMeansFit> = None;
    for _ in 0..params.n_init.max(1) {
        let init = init_plus_plus(points, k, &mut rng);
        let run = lloyd(points, init, params.max_iter);
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.unwrap_or_else(|| KMeansFit {
        labels: vec![0; points.len()],
        centroids: vec![vec![]],
        inertia: 0.0,
    })
}

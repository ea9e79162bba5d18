use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq)]
pub struct Clustering {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
}

/// Lloyd's k-means with k-means++ seeding. Runs `restarts` independent
/// seedings and keeps the one with the lowest inertia.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KMeans {
    pub clusters: usize,
    pub max_iterations: usize,
    pub restarts: usize,
    pub seed: u64,
}

impl KMeans {
    pub fn fit(&self, points: &[Vec<f64>]) -> Result<Clustering, DomainError> {
        if self.clusters == 0 {
            return Err(DomainError::InvariantViolation(
                "k-means needs at least one cluster".to_owned(),
            ));
        }
        if points.len() < self.clusters {
            return Err(DomainError::insufficient("customers", self.clusters, points.len()));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<Clustering> = None;
        for _ in 0..self.restarts.max(1) {
            let candidate = self.run_once(points, &mut rng);
            match &best {
                Some(current) if candidate.inertia >= current.inertia => {}
                _ => best = Some(candidate),
            }
        }
        best.ok_or_else(|| {
            DomainError::InvariantViolation("k-means produced no clustering".to_owned())
        })
    }

    fn run_once(&self, points: &[Vec<f64>], rng: &mut StdRng) -> Clustering {
        let mut centroids = seed_plus_plus(points, self.clusters, rng);
        let mut assignments = vec![usize::MAX; points.len()];

        for _ in 0..self.max_iterations.max(1) {
            let mut changed = false;
            for (point, assignment) in points.iter().zip(assignments.iter_mut()) {
                let nearest = nearest(point, &centroids).0;
                if *assignment != nearest {
                    *assignment = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let dims = points[0].len();
            let mut sums = vec![vec![0.0; dims]; self.clusters];
            let mut counts = vec![0usize; self.clusters];
            for (point, &cluster) in points.iter().zip(&assignments) {
                counts[cluster] += 1;
                for (sum, value) in sums[cluster].iter_mut().zip(point) {
                    *sum += value;
                }
            }
            // An emptied cluster keeps its previous centroid.
            for (cluster, sum) in sums.into_iter().enumerate() {
                if counts[cluster] > 0 {
                    let count = counts[cluster] as f64;
                    centroids[cluster] = sum.into_iter().map(|value| value / count).collect();
                }
            }
        }

        let inertia = points.iter().map(|point| nearest(point, &centroids).1).sum();
        let assignments = points.iter().map(|point| nearest(point, &centroids).0).collect();
        Clustering { assignments, centroids, inertia }
    }
}

fn squared_distance(left: &[f64], right: &[f64]) -> f64 {
    left.iter().zip(right).map(|(a, b)| (a - b) * (a - b)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

/// First centre uniform, each next one drawn with probability proportional
/// to its squared distance from the nearest chosen centre.
fn seed_plus_plus(points: &[Vec<f64>], clusters: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(clusters);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    while centroids.len() < clusters {
        let weights: Vec<f64> = points.iter().map(|point| nearest(point, &centroids).1).collect();
        let total: f64 = weights.iter().sum();

        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (index, weight) in weights.iter().enumerate() {
                if target < *weight {
                    chosen = index;
                    break;
                }
                target -= weight;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[chosen].clone());
    }
    centroids
}

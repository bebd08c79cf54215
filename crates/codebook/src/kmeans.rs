//! K-means clustering with k-means++ initialization over the
//! reduced-feature space.

use photonpack_core::distance::l2_distance_squared;
use photonpack_core::TemplateSettings;
use photonpack_storage::Matrix;
use rand::prelude::*;
use rayon::prelude::*;

/// Configuration for k-means clustering.
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters (k).
    pub num_clusters: usize,
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Convergence threshold (fraction of rows that changed assignment).
    pub convergence_threshold: f64,
    /// Random seed. Runs are reproducible only when this is set.
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            num_clusters: 4000,
            max_iterations: 20,
            convergence_threshold: 0.001,
            seed: None,
        }
    }
}

impl From<&TemplateSettings> for KMeansConfig {
    fn from(settings: &TemplateSettings) -> Self {
        Self {
            num_clusters: settings.num_templates,
            max_iterations: settings.max_iterations,
            convergence_threshold: settings.convergence_threshold,
            seed: settings.seed,
        }
    }
}

/// Result of k-means clustering.
#[derive(Debug)]
pub struct KMeansResult {
    /// Centroids, flattened `[k * dim]`.
    pub centroids: Vec<f32>,
    /// Cluster assignment for each feature row.
    pub assignments: Vec<usize>,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Whether the algorithm converged within the iteration budget.
    pub converged: bool,
}

/// Run k-means over the rows of a feature matrix.
///
/// Uses k-means++ initialization; the assignment step is row-parallel,
/// the outer loop sequential. k is clamped to the number of rows.
pub fn kmeans(features: &Matrix, config: &KMeansConfig) -> KMeansResult {
    let n = features.rows();
    if n == 0 {
        return KMeansResult {
            centroids: Vec::new(),
            assignments: Vec::new(),
            iterations: 0,
            converged: true,
        };
    }

    let dim = features.cols();
    let k = config.num_clusters.min(n);

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut centroids = kmeans_plusplus_init(features, k, &mut rng);
    let mut assignments = vec![0usize; n];

    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        // Assign rows to nearest centroid (parallel); ties go to the
        // lowest cluster index.
        let new_assignments: Vec<usize> = (0..n)
            .into_par_iter()
            .map(|i| nearest_centroid(features.row(i), &centroids, dim))
            .collect();

        let changes: usize = assignments
            .iter()
            .zip(new_assignments.iter())
            .filter(|(a, b)| a != b)
            .count();

        assignments = new_assignments;

        let change_ratio = changes as f64 / n as f64;
        tracing::debug!(
            "k-means iteration {}: {} changes ({:.2}%)",
            iter + 1,
            changes,
            change_ratio * 100.0
        );

        if change_ratio < config.convergence_threshold {
            converged = true;
            break;
        }

        centroids = update_centroids(features, &assignments, k, dim);
    }

    KMeansResult {
        centroids,
        assignments,
        iterations,
        converged,
    }
}

/// Nearest centroid by squared Euclidean distance, lowest index on ties.
#[inline]
pub(crate) fn nearest_centroid(row: &[f32], centroids: &[f32], dim: usize) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f32::MAX;
    for (ki, centroid) in centroids.chunks_exact(dim).enumerate() {
        let dist = l2_distance_squared(row, centroid);
        if dist < best_dist {
            best_dist = dist;
            best_idx = ki;
        }
    }
    best_idx
}

/// K-means++ initialization.
fn kmeans_plusplus_init<R: Rng>(features: &Matrix, k: usize, rng: &mut R) -> Vec<f32> {
    let n = features.rows();
    let dim = features.cols();
    let mut centroids = vec![0.0f32; k * dim];

    // First centroid uniformly at random.
    let first_idx = rng.gen_range(0..n);
    centroids[..dim].copy_from_slice(features.row(first_idx));

    let mut min_distances: Vec<f32> = (0..n)
        .map(|i| l2_distance_squared(features.row(i), &centroids[..dim]))
        .collect();

    // Remaining centroids proportional to squared distance.
    for ki in 1..k {
        let total_dist: f64 = min_distances.iter().map(|&d| d as f64).sum();
        let offset = ki * dim;

        if total_dist == 0.0 {
            // All remaining rows duplicate an existing centroid.
            let idx = rng.gen_range(0..n);
            centroids[offset..offset + dim].copy_from_slice(features.row(idx));
            continue;
        }

        let threshold = rng.gen::<f64>() * total_dist;
        let mut cumsum = 0.0;
        let mut chosen_idx = 0;

        for (i, &dist) in min_distances.iter().enumerate() {
            cumsum += dist as f64;
            if cumsum >= threshold {
                chosen_idx = i;
                break;
            }
        }

        centroids[offset..offset + dim].copy_from_slice(features.row(chosen_idx));

        for (i, dist) in min_distances.iter_mut().enumerate() {
            let d = l2_distance_squared(features.row(i), &centroids[offset..offset + dim]);
            if d < *dist {
                *dist = d;
            }
        }
    }

    centroids
}

/// Recompute centroids as per-cluster means.
fn update_centroids(features: &Matrix, assignments: &[usize], k: usize, dim: usize) -> Vec<f32> {
    let cluster_means: Vec<Vec<f32>> = (0..k)
        .into_par_iter()
        .map(|cluster_idx| {
            let mut sum = vec![0.0f64; dim];
            let mut count = 0usize;

            for (i, &assignment) in assignments.iter().enumerate() {
                if assignment == cluster_idx {
                    for (j, &v) in features.row(i).iter().enumerate() {
                        sum[j] += v as f64;
                    }
                    count += 1;
                }
            }

            if count == 0 {
                // Empty cluster: keep a zero centroid rather than fail.
                vec![0.0f32; dim]
            } else {
                sum.iter().map(|&s| (s / count as f64) as f32).collect()
            }
        })
        .collect();

    let mut centroids = Vec::with_capacity(k * dim);
    for mean in cluster_means {
        centroids.extend_from_slice(&mean);
    }
    centroids
}

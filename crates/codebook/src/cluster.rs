//! Pluggable clustering over the reduced-feature matrix.

use crate::error::{CodebookError, CodebookResult};
use crate::kmeans::{kmeans, nearest_centroid, KMeansConfig};
use photonpack_storage::Matrix;
use rayon::prelude::*;

/// Cluster labels for the rows of a feature matrix.
#[derive(Debug, Clone)]
pub struct Assignments {
    /// One cluster label per feature row, each in `[0, num_clusters)`.
    pub labels: Vec<usize>,
    /// The codebook size K. Clusters with no assigned row are allowed.
    pub num_clusters: usize,
}

/// A clustering strategy.
///
/// The codebook builder only consumes [`Assignments`]; which algorithm
/// produced them is invisible downstream.
pub trait Clusterer {
    fn cluster(&self, features: &Matrix) -> CodebookResult<Assignments>;
}

/// K-means clustering run in-process.
#[derive(Debug, Clone, Default)]
pub struct KMeansClusterer {
    pub config: KMeansConfig,
}

impl KMeansClusterer {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }
}

impl Clusterer for KMeansClusterer {
    fn cluster(&self, features: &Matrix) -> CodebookResult<Assignments> {
        if self.config.num_clusters == 0 {
            return Err(CodebookError::InvalidParams(
                "num_clusters must be > 0".into(),
            ));
        }

        let result = kmeans(features, &self.config);
        tracing::info!(
            "k-means finished after {} iterations (converged: {})",
            result.iterations,
            result.converged
        );

        // K stays the requested codebook size even when k-means clamped
        // to fewer rows; the surplus clusters are simply empty.
        Ok(Assignments {
            labels: result.assignments,
            num_clusters: self.config.num_clusters,
        })
    }
}

/// Assignment against a precomputed centroid matrix (K x F).
///
/// Each feature row goes to the nearest centroid in Euclidean distance,
/// ties to the lowest index. Use this to seed the codebook from a
/// clustering trained elsewhere.
#[derive(Debug, Clone)]
pub struct NearestCentroid {
    centroids: Matrix,
}

impl NearestCentroid {
    /// Wrap a centroid matrix. Non-finite entries are zeroed, matching
    /// how externally produced centroid files are loaded.
    pub fn new(mut centroids: Matrix) -> Self {
        centroids.sanitize_non_finite();
        Self { centroids }
    }

    pub fn num_clusters(&self) -> usize {
        self.centroids.rows()
    }
}

impl Clusterer for NearestCentroid {
    fn cluster(&self, features: &Matrix) -> CodebookResult<Assignments> {
        if self.centroids.rows() == 0 {
            return Err(CodebookError::InvalidParams(
                "centroid matrix has no rows".into(),
            ));
        }
        if features.rows() > 0 && self.centroids.cols() != features.cols() {
            return Err(CodebookError::FeatureDimMismatch {
                centroid_cols: self.centroids.cols(),
                feature_cols: features.cols(),
            });
        }

        let dim = self.centroids.cols();
        let labels: Vec<usize> = (0..features.rows())
            .into_par_iter()
            .map(|i| nearest_centroid(features.row(i), self.centroids.data(), dim))
            .collect();

        Ok(Assignments {
            labels,
            num_clusters: self.centroids.rows(),
        })
    }
}

//! Codebook training: cluster reduced features, aggregate raw angular
//! maps per cluster into templates.
//!
//! Clustering is pluggable: k-means is one [`Clusterer`], an externally
//! trained centroid matrix another. The builder itself only sees cluster
//! assignments.

pub mod builder;
pub mod cluster;
pub mod error;
pub mod kmeans;

pub use builder::{Codebook, CodebookBuilder};
pub use cluster::{Assignments, Clusterer, KMeansClusterer, NearestCentroid};
pub use error::{CodebookError, CodebookResult};
pub use kmeans::{kmeans, KMeansConfig, KMeansResult};

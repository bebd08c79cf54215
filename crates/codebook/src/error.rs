//! Codebook error types.

use photonpack_storage::StorageError;
use photonpack_table::TableError;
use thiserror::Error;

/// Codebook-related errors.
#[derive(Error, Debug)]
pub enum CodebookError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("feature dimension mismatch: centroids have {centroid_cols} columns, features {feature_cols}")]
    FeatureDimMismatch {
        centroid_cols: usize,
        feature_cols: usize,
    },

    #[error("invalid codebook artifact: {0}")]
    InvalidArtifact(String),

    #[error("invalid magic bytes (not a codebook file)")]
    InvalidMagic,

    #[error("unsupported codebook version: {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodebookResult<T> = Result<T, CodebookError>;

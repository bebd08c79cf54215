//! Table error types.

use photonpack_storage::StorageError;
use thiserror::Error;

/// Table-related errors.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("shape mismatch: {expected} unmasked training bins but {got} feature rows")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("count buffer length {got} does not match shape {shape} ({expected} cells)")]
    CountLength {
        shape: photonpack_core::TableShape,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type TableResult<T> = Result<T, TableError>;

//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid magic bytes (not a {expected} file)")]
    InvalidMagic { expected: &'static str },

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("output already exists: {}", .0.display())]
    OutputExists(PathBuf),
}

pub type StorageResult<T> = Result<T, StorageError>;

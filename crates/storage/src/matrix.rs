//! 2-D float matrix artifact, used for reduced-feature and centroid inputs.

use crate::artifact::write_atomic;
use crate::error::{StorageError, StorageResult};
use std::fs;
use std::path::Path;

/// Magic bytes for matrix files.
pub const MATRIX_MAGIC: &[u8; 7] = b"PTMAT1\0";

/// Current matrix format version.
pub const MATRIX_VERSION: u32 = 1;

/// Size of the fixed header in bytes (magic + version + rows + cols, padded).
pub const HEADER_SIZE: usize = 24;

/// A dense row-major `f32` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> StorageResult<Self> {
        if data.len() != rows * cols {
            return Err(StorageError::InvalidArtifact(format!(
                "matrix data length {} does not match {}x{}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Replace non-finite entries with zero.
    ///
    /// Externally produced centroid files occasionally carry NaN rows for
    /// clusters that never converged; a zero centroid is harmless while a
    /// NaN poisons every distance it touches.
    pub fn sanitize_non_finite(&mut self) -> usize {
        let mut replaced = 0;
        for v in &mut self.data {
            if !v.is_finite() {
                *v = 0.0;
                replaced += 1;
            }
        }
        if replaced > 0 {
            tracing::warn!("replaced {} non-finite matrix entries with 0", replaced);
        }
        replaced
    }

    /// Serialize to the matrix artifact format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.data.len() * 4);
        bytes.extend_from_slice(MATRIX_MAGIC);
        bytes.extend_from_slice(&MATRIX_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.rows as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.cols as u32).to_le_bytes());
        bytes.resize(HEADER_SIZE, 0);
        for &v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Deserialize from the matrix artifact format.
    pub fn from_bytes(data: &[u8]) -> StorageResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(StorageError::InvalidArtifact(
                "matrix file too short for header".into(),
            ));
        }
        if &data[0..7] != MATRIX_MAGIC {
            return Err(StorageError::InvalidMagic { expected: "matrix" });
        }
        let version = u32::from_le_bytes(data[7..11].try_into().unwrap());
        if version != MATRIX_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }
        let rows = u32::from_le_bytes(data[11..15].try_into().unwrap()) as usize;
        let cols = u32::from_le_bytes(data[15..19].try_into().unwrap()) as usize;

        let expected = rows * cols * 4;
        if data.len() < HEADER_SIZE + expected {
            return Err(StorageError::InvalidArtifact(format!(
                "matrix file truncated: expected {} payload bytes, found {}",
                expected,
                data.len() - HEADER_SIZE
            )));
        }

        let values: Vec<f32> = data[HEADER_SIZE..HEADER_SIZE + expected]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();

        Self::new(rows, cols, values)
    }

    /// Load a matrix artifact from disk.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Load a matrix artifact, zeroing non-finite entries.
    pub fn load_sanitized(path: &Path) -> StorageResult<Self> {
        let mut matrix = Self::load(path)?;
        matrix.sanitize_non_finite();
        Ok(matrix)
    }

    /// Write the matrix artifact to disk.
    pub fn save(&self, path: &Path, overwrite: bool) -> StorageResult<()> {
        write_atomic(path, &self.to_bytes(), overwrite)
    }
}

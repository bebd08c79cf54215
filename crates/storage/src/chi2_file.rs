//! Chi2 diagnostic artifact: one `f32` fit statistic per spatial-time bin.

use crate::artifact::write_atomic_with;
use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Magic bytes for chi2 files.
pub const CHI2_MAGIC: &[u8; 7] = b"PTCHI1\0";

/// Current chi2 format version.
pub const CHI2_VERSION: u32 = 1;

/// Size of the fixed header in bytes (magic + version + 3 dims, padded).
pub const HEADER_SIZE: usize = 24;

/// Write a chi2 artifact.
pub fn write_chi2_table(
    path: &Path,
    spatial_dims: [usize; 3],
    chi2: &[f32],
    overwrite: bool,
) -> StorageResult<()> {
    let bins = spatial_dims[0] * spatial_dims[1] * spatial_dims[2];
    if chi2.len() != bins {
        return Err(StorageError::InvalidArtifact(format!(
            "chi2 table length {} does not match {} spatial bins",
            chi2.len(),
            bins
        )));
    }

    write_atomic_with(path, overwrite, |writer| {
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(CHI2_MAGIC);
        header.extend_from_slice(&CHI2_VERSION.to_le_bytes());
        for dim in spatial_dims {
            header.extend_from_slice(&(dim as u32).to_le_bytes());
        }
        header.resize(HEADER_SIZE, 0);
        writer.write_all(&header)?;

        for &v in chi2 {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    })
}

/// Read a chi2 artifact, returning its spatial dims and values.
pub fn read_chi2_table(path: &Path) -> StorageResult<([usize; 3], Vec<f32>)> {
    let bytes = fs::read(path)?;
    if bytes.len() < HEADER_SIZE {
        return Err(StorageError::InvalidArtifact(
            "chi2 file too short for header".into(),
        ));
    }
    if &bytes[0..7] != CHI2_MAGIC {
        return Err(StorageError::InvalidMagic { expected: "chi2" });
    }
    let version = u32::from_le_bytes(bytes[7..11].try_into().unwrap());
    if version != CHI2_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }

    let mut dims = [0usize; 3];
    for (i, dim) in dims.iter_mut().enumerate() {
        let offset = 11 + i * 4;
        *dim = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
    }

    let bins = dims[0] * dims[1] * dims[2];
    let expected = bins * 4;
    if bytes.len() < HEADER_SIZE + expected {
        return Err(StorageError::InvalidArtifact(format!(
            "chi2 file truncated: expected {} values",
            bins
        )));
    }

    let values: Vec<f32> = bytes[HEADER_SIZE..HEADER_SIZE + expected]
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect();

    Ok((dims, values))
}

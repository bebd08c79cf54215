//! The compact template-map artifact: one `(index: u16, weight: f32)`
//! record per spatial-time bin, row-major over (r, theta, t).
//!
//! This pairing is the compressed table. Together with the codebook it
//! supports O(1) random-access reconstruction of any bin's angular map as
//! `weight * normalize(codebook[index])`.

use crate::artifact::write_atomic_with;
use crate::error::{StorageError, StorageResult};
use memmap2::Mmap;
use photonpack_core::Bin3;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Magic bytes for template-map files.
pub const MAP_MAGIC: &[u8; 7] = b"PTMAP1\0";

/// Current template-map format version.
pub const MAP_VERSION: u32 = 1;

/// Size of the fixed header in bytes (magic + version + 3 dims, padded).
pub const HEADER_SIZE: usize = 24;

/// Bytes per packed record.
pub const RECORD_SIZE: usize = 6;

fn header_bytes(spatial_dims: [usize; 3]) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(MAP_MAGIC);
    header.extend_from_slice(&MAP_VERSION.to_le_bytes());
    for dim in spatial_dims {
        header.extend_from_slice(&(dim as u32).to_le_bytes());
    }
    header.resize(HEADER_SIZE, 0);
    header
}

/// Pack parallel index/weight tables into the record payload.
///
/// Deterministic byte-for-byte: encoding the same tables twice yields
/// identical output.
pub fn encode_records(index: &[u16], weight: &[f32]) -> Vec<u8> {
    debug_assert_eq!(index.len(), weight.len());
    let mut bytes = Vec::with_capacity(index.len() * RECORD_SIZE);
    for (&idx, &w) in index.iter().zip(weight.iter()) {
        bytes.extend_from_slice(&idx.to_le_bytes());
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    bytes
}

/// Write a template-map artifact.
pub fn write_template_map(
    path: &Path,
    spatial_dims: [usize; 3],
    index: &[u16],
    weight: &[f32],
    overwrite: bool,
) -> StorageResult<()> {
    let bins = spatial_dims[0] * spatial_dims[1] * spatial_dims[2];
    if index.len() != bins || weight.len() != bins {
        return Err(StorageError::InvalidArtifact(format!(
            "template map length {}/{} does not match {} spatial bins",
            index.len(),
            weight.len(),
            bins
        )));
    }

    write_atomic_with(path, overwrite, |writer| {
        writer.write_all(&header_bytes(spatial_dims))?;
        writer.write_all(&encode_records(index, weight))?;
        Ok(())
    })
}

/// A template map backed by a read-only memory map.
pub struct LoadedTemplateMap {
    spatial_dims: [usize; 3],
    mmap: Mmap,
}

impl LoadedTemplateMap {
    /// Open a template-map file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < HEADER_SIZE {
            return Err(StorageError::InvalidArtifact(
                "template map too short for header".into(),
            ));
        }
        if &mmap[0..7] != MAP_MAGIC {
            return Err(StorageError::InvalidMagic {
                expected: "template map",
            });
        }
        let version = u32::from_le_bytes(mmap[7..11].try_into().unwrap());
        if version != MAP_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }

        let mut spatial_dims = [0usize; 3];
        for (i, dim) in spatial_dims.iter_mut().enumerate() {
            let offset = 11 + i * 4;
            *dim = u32::from_le_bytes(mmap[offset..offset + 4].try_into().unwrap()) as usize;
        }

        let bins = spatial_dims[0] * spatial_dims[1] * spatial_dims[2];
        if mmap.len() < HEADER_SIZE + bins * RECORD_SIZE {
            return Err(StorageError::InvalidArtifact(format!(
                "template map truncated: expected {} records",
                bins
            )));
        }

        Ok(Self { spatial_dims, mmap })
    }

    pub fn spatial_dims(&self) -> [usize; 3] {
        self.spatial_dims
    }

    /// Number of records (spatial bins).
    pub fn len(&self) -> usize {
        self.spatial_dims[0] * self.spatial_dims[1] * self.spatial_dims[2]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at a linear spatial index.
    #[inline]
    pub fn record(&self, index: usize) -> (u16, f32) {
        let offset = HEADER_SIZE + index * RECORD_SIZE;
        let idx = u16::from_le_bytes(self.mmap[offset..offset + 2].try_into().unwrap());
        let weight = f32::from_le_bytes(self.mmap[offset + 2..offset + 6].try_into().unwrap());
        (idx, weight)
    }

    /// Record at a 3-D spatial bin coordinate.
    #[inline]
    pub fn record_at(&self, bin: Bin3) -> (u16, f32) {
        let [_, theta, t] = self.spatial_dims;
        self.record((bin[0] * theta + bin[1]) * t + bin[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_encode_is_idempotent() {
        let index = vec![0u16, 3, 65535, 7];
        let weight = vec![0.0f32, 1.5, 1e9, 0.25];

        let first = encode_records(&index, &weight);
        let second = encode_records(&index, &weight);
        assert_eq!(first, second);
        assert_eq!(first.len(), index.len() * RECORD_SIZE);
    }

    #[test]
    fn test_write_is_byte_identical() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.ptmap");
        let b = dir.path().join("b.ptmap");

        let index = vec![1u16, 2, 3, 4, 5, 6];
        let weight = vec![10.0f32, 20.0, 30.0, 40.0, 50.0, 60.0];

        write_template_map(&a, [1, 2, 3], &index, &weight, false).unwrap();
        write_template_map(&b, [1, 2, 3], &index, &weight, false).unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_roundtrip_random_access() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.ptmap");

        let dims = [2, 3, 2];
        let bins = 12;
        let index: Vec<u16> = (0..bins as u16).collect();
        let weight: Vec<f32> = (0..bins).map(|i| i as f32 * 0.5).collect();

        write_template_map(&path, dims, &index, &weight, false).unwrap();

        let map = LoadedTemplateMap::open(&path).unwrap();
        assert_eq!(map.spatial_dims(), dims);
        assert_eq!(map.len(), bins);
        assert_eq!(map.record(0), (0, 0.0));
        assert_eq!(map.record(11), (11, 5.5));
        // [1, 2, 1] -> (1 * 3 + 2) * 2 + 1 = 11
        assert_eq!(map.record_at([1, 2, 1]), (11, 5.5));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.ptmap");

        let err =
            write_template_map(&path, [2, 2, 2], &[0u16; 7], &[0.0f32; 7], false).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArtifact(_)));
        assert!(!path.exists());
    }
}

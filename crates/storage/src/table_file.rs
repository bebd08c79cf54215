//! Raw 5-D photon table file.
//!
//! Tables run to 10^8-10^9 cells, so the reader hands out a read-only
//! memory-mapped view instead of copying the counts into the heap. The
//! header is padded to 32 bytes; together with the page alignment of the
//! map itself that keeps the `f32` payload 4-byte aligned.

use crate::artifact::write_atomic_with;
use crate::error::{StorageError, StorageResult};
use memmap2::Mmap;
use photonpack_core::TableShape;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Magic bytes for raw table files.
pub const TABLE_MAGIC: &[u8; 7] = b"PTTAB1\0";

/// Current table format version.
pub const TABLE_VERSION: u32 = 1;

/// Size of the fixed header in bytes (magic + version + 5 dims, padded).
pub const HEADER_SIZE: usize = 32;

fn parse_header(data: &[u8]) -> StorageResult<TableShape> {
    if data.len() < HEADER_SIZE {
        return Err(StorageError::InvalidArtifact(
            "table file too short for header".into(),
        ));
    }
    if &data[0..7] != TABLE_MAGIC {
        return Err(StorageError::InvalidMagic { expected: "table" });
    }
    let version = u32::from_le_bytes(data[7..11].try_into().unwrap());
    if version != TABLE_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }

    let mut dims = [0usize; 5];
    for (i, dim) in dims.iter_mut().enumerate() {
        let offset = 11 + i * 4;
        *dim = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
    }
    Ok(TableShape::new(dims[0], dims[1], dims[2], dims[3], dims[4]))
}

/// A raw table backed by a read-only memory map.
pub struct LoadedTable {
    shape: TableShape,
    mmap: Mmap,
}

impl LoadedTable {
    /// Open a table file.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let shape = parse_header(&mmap)?;
        let expected = HEADER_SIZE + shape.total_cells() * 4;
        if mmap.len() < expected {
            return Err(StorageError::InvalidArtifact(format!(
                "table file truncated: expected {} bytes for shape {}, found {}",
                expected,
                shape,
                mmap.len()
            )));
        }

        tracing::info!(
            "mapped table {} with shape {} ({} cells)",
            path.display(),
            shape,
            shape.total_cells()
        );
        Ok(Self { shape, mmap })
    }

    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// The full flat count buffer, row-major over all five axes.
    pub fn counts(&self) -> &[f32] {
        let bytes = &self.mmap[HEADER_SIZE..HEADER_SIZE + self.shape.total_cells() * 4];
        // Safety: the payload starts at a 4-byte-aligned offset of a
        // page-aligned map and holds exactly total_cells() f32 values.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, self.shape.total_cells()) }
    }
}

/// Write a raw table file.
pub fn write_table(
    path: &Path,
    shape: TableShape,
    counts: &[f32],
    overwrite: bool,
) -> StorageResult<()> {
    if counts.len() != shape.total_cells() {
        return Err(StorageError::InvalidArtifact(format!(
            "count buffer length {} does not match shape {}",
            counts.len(),
            shape
        )));
    }

    write_atomic_with(path, overwrite, |writer| {
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(TABLE_MAGIC);
        header.extend_from_slice(&TABLE_VERSION.to_le_bytes());
        for dim in [
            shape.r_bins,
            shape.theta_bins,
            shape.t_bins,
            shape.theta_dir_bins,
            shape.phi_dir_bins,
        ] {
            header.extend_from_slice(&(dim as u32).to_le_bytes());
        }
        header.resize(HEADER_SIZE, 0);
        writer.write_all(&header)?;

        for &v in counts {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    })
}

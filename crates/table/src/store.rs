//! The table store: exclusive owner of the raw counts for the duration of
//! a run, handing out read-only raw, marginal, and angular views.

use crate::error::{TableError, TableResult};
use photonpack_core::{Bin3, Bin5, TableShape};
use photonpack_storage::LoadedTable;
use rayon::prelude::*;
use std::path::Path;
use std::sync::OnceLock;

enum TableCounts {
    InMemory(Vec<f32>),
    Mapped(LoadedTable),
}

impl TableCounts {
    fn as_slice(&self) -> &[f32] {
        match self {
            TableCounts::InMemory(counts) => counts,
            TableCounts::Mapped(table) => table.counts(),
        }
    }
}

/// Read-only typed access to one raw 5-D photon table.
///
/// The marginal table (per-bin total photon count) is computed on first
/// use and cached; angular maps are borrowed contiguous slices of the raw
/// buffer. Every view is immutable, so the store is shared freely across
/// worker threads.
pub struct TableStore {
    counts: TableCounts,
    shape: TableShape,
    marginal: OnceLock<Vec<f32>>,
}

impl TableStore {
    /// Build a store over an in-memory count buffer.
    pub fn from_counts(counts: Vec<f32>, shape: TableShape) -> TableResult<Self> {
        if counts.len() != shape.total_cells() {
            return Err(TableError::CountLength {
                shape,
                expected: shape.total_cells(),
                got: counts.len(),
            });
        }
        Ok(Self {
            counts: TableCounts::InMemory(counts),
            shape,
            marginal: OnceLock::new(),
        })
    }

    /// Open a table file and serve views from the memory map.
    pub fn open(path: &Path) -> TableResult<Self> {
        let table = LoadedTable::open(path)?;
        Ok(Self {
            shape: table.shape(),
            counts: TableCounts::Mapped(table),
            marginal: OnceLock::new(),
        })
    }

    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// The full flat count buffer.
    pub fn counts(&self) -> &[f32] {
        self.counts.as_slice()
    }

    /// Count in a single 5-D cell.
    #[inline]
    pub fn raw(&self, bin: Bin5) -> f32 {
        self.counts.as_slice()[self.shape.cell_index(bin)]
    }

    /// The cached 3-D marginal table, one total photon count per spatial
    /// bin. Accumulated in f64, stored as f32.
    pub fn marginal_table(&self) -> &[f32] {
        self.marginal.get_or_init(|| {
            let cells = self.shape.angular_cells();
            self.counts
                .as_slice()
                .par_chunks(cells)
                .map(|map| map.iter().map(|&v| v as f64).sum::<f64>() as f32)
                .collect()
        })
    }

    /// Marginal (total photon count) of one spatial bin.
    #[inline]
    pub fn marginal(&self, bin: Bin3) -> f32 {
        self.marginal_table()[self.shape.spatial_index(bin)]
    }

    /// Raw angular map of a spatial bin, by linear index.
    #[inline]
    pub fn angular_map_at(&self, index: usize) -> &[f32] {
        let cells = self.shape.angular_cells();
        let start = index * cells;
        &self.counts.as_slice()[start..start + cells]
    }

    /// Raw angular map of a spatial bin.
    #[inline]
    pub fn angular_map(&self, bin: Bin3) -> &[f32] {
        self.angular_map_at(self.shape.spatial_index(bin))
    }

    /// Normalized angular map of a spatial bin, by linear index.
    ///
    /// Cells are divided by the bin marginal so the map sums to 1. A bin
    /// with zero marginal yields the all-zero map; the same substitution
    /// applies anywhere a normalized map is requested.
    pub fn normalized_map_at(&self, index: usize) -> Vec<f32> {
        let map = self.angular_map_at(index);
        let marginal = self.marginal_table()[index];
        if marginal > 0.0 {
            let inv = 1.0 / marginal;
            map.iter().map(|&v| v * inv).collect()
        } else {
            vec![0.0; map.len()]
        }
    }

    /// Normalized angular map of a spatial bin.
    pub fn normalized_map(&self, bin: Bin3) -> Vec<f32> {
        self.normalized_map_at(self.shape.spatial_index(bin))
    }

    /// Training mask over spatial bins: true admits the bin to codebook
    /// training. Bins whose marginal falls below `min_marginal` carry
    /// shapes dominated by sampling noise and are kept out.
    pub fn training_mask(&self, min_marginal: f32) -> Vec<bool> {
        self.marginal_table()
            .iter()
            .map(|&m| m >= min_marginal)
            .collect()
    }

    /// Check that an externally produced feature matrix has exactly one
    /// row per unmasked training bin. A mismatch is fatal; rows are never
    /// silently truncated to fit.
    pub fn check_feature_rows(&self, rows: usize, mask: &[bool]) -> TableResult<()> {
        let expected = mask.iter().filter(|&&admitted| admitted).count();
        if rows != expected {
            return Err(TableError::ShapeMismatch {
                expected,
                got: rows,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> TableStore {
        // Shape (1, 2, 1, 2, 2): two spatial bins, four angular cells each.
        let shape = TableShape::new(1, 2, 1, 2, 2);
        let counts = vec![
            1.0, 2.0, 3.0, 4.0, // bin [0,0,0], marginal 10
            0.0, 0.0, 0.0, 0.0, // bin [0,1,0], marginal 0
        ];
        TableStore::from_counts(counts, shape).unwrap()
    }

    #[test]
    fn test_raw_access() {
        let store = small_store();
        assert_eq!(store.raw([0, 0, 0, 0, 0]), 1.0);
        assert_eq!(store.raw([0, 0, 0, 1, 1]), 4.0);
        assert_eq!(store.raw([0, 1, 0, 0, 1]), 0.0);
    }

    #[test]
    fn test_marginal() {
        let store = small_store();
        assert_eq!(store.marginal([0, 0, 0]), 10.0);
        assert_eq!(store.marginal([0, 1, 0]), 0.0);
        assert_eq!(store.marginal_table(), &[10.0, 0.0]);
    }

    #[test]
    fn test_angular_map_is_contiguous_slice() {
        let store = small_store();
        assert_eq!(store.angular_map([0, 0, 0]), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.angular_map([0, 1, 0]), &[0.0; 4]);
    }

    #[test]
    fn test_normalized_map() {
        let store = small_store();
        let map = store.normalized_map([0, 0, 0]);
        assert_eq!(map, vec![0.1, 0.2, 0.3, 0.4]);
        let total: f32 = map.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_marginal_normalizes_to_zero_map() {
        let store = small_store();
        let map = store.normalized_map([0, 1, 0]);
        assert_eq!(map, vec![0.0; 4]);
        assert!(map.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_training_mask() {
        let store = small_store();
        assert_eq!(store.training_mask(5.0), vec![true, false]);
        assert_eq!(store.training_mask(100.0), vec![false, false]);
        assert_eq!(store.training_mask(0.0), vec![true, true]);
    }

    #[test]
    fn test_feature_row_check() {
        let store = small_store();
        let mask = store.training_mask(5.0);
        assert!(store.check_feature_rows(1, &mask).is_ok());

        let err = store.check_feature_rows(2, &mask).unwrap_err();
        match err {
            TableError::ShapeMismatch { expected, got } => {
                assert_eq!(expected, 1);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_wrong_buffer_length() {
        let shape = TableShape::new(1, 2, 1, 2, 2);
        assert!(matches!(
            TableStore::from_counts(vec![0.0; 7], shape),
            Err(TableError::CountLength { .. })
        ));
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.pttab");
        let shape = TableShape::new(1, 2, 1, 2, 2);
        let counts = vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0];
        photonpack_storage::write_table(&path, shape, &counts, false).unwrap();

        let store = TableStore::open(&path).unwrap();
        assert_eq!(store.shape(), shape);
        assert_eq!(store.marginal([0, 0, 0]), 10.0);
        assert_eq!(store.angular_map([0, 0, 0]), &[1.0, 2.0, 3.0, 4.0]);
    }
}

//! The codebook itself and the builder that trains it.

use crate::cluster::Clusterer;
use crate::error::{CodebookError, CodebookResult};
use photonpack_storage::{write_atomic, Matrix};
use photonpack_table::TableStore;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Magic bytes for codebook files.
pub const CODEBOOK_MAGIC: &[u8; 7] = b"PTCBK1\0";

/// Current codebook format version.
pub const CODEBOOK_VERSION: u32 = 1;

/// Size of the fixed header in bytes (magic + version + 3 dims, padded).
pub const HEADER_SIZE: usize = 24;

/// A trained codebook: K raw (unnormalized) angular templates.
///
/// Each template is the element-wise sum of the raw angular maps of every
/// training bin assigned to that cluster, stored flattened
/// `[K * theta_dir * phi_dir]`. Immutable once built; ownership passes to
/// the quantization phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    num_templates: usize,
    theta_dir_bins: usize,
    phi_dir_bins: usize,
    templates: Vec<f32>,
}

impl Codebook {
    /// Create an all-zero codebook.
    pub fn new_zeroed(num_templates: usize, angular_dims: [usize; 2]) -> Self {
        Self {
            num_templates,
            theta_dir_bins: angular_dims[0],
            phi_dir_bins: angular_dims[1],
            templates: vec![0.0; num_templates * angular_dims[0] * angular_dims[1]],
        }
    }

    /// Build a codebook directly from template data (testing and external
    /// seeding). `templates` is flattened `[K * cells]`.
    pub fn from_templates(
        num_templates: usize,
        angular_dims: [usize; 2],
        templates: Vec<f32>,
    ) -> CodebookResult<Self> {
        let cells = angular_dims[0] * angular_dims[1];
        if templates.len() != num_templates * cells {
            return Err(CodebookError::InvalidParams(format!(
                "template data length {} does not match {} templates of {} cells",
                templates.len(),
                num_templates,
                cells
            )));
        }
        Ok(Self {
            num_templates,
            theta_dir_bins: angular_dims[0],
            phi_dir_bins: angular_dims[1],
            templates,
        })
    }

    pub fn num_templates(&self) -> usize {
        self.num_templates
    }

    pub fn angular_dims(&self) -> [usize; 2] {
        [self.theta_dir_bins, self.phi_dir_bins]
    }

    /// Cells per template.
    pub fn cells(&self) -> usize {
        self.theta_dir_bins * self.phi_dir_bins
    }

    /// Raw template k.
    #[inline]
    pub fn template(&self, k: usize) -> &[f32] {
        let cells = self.cells();
        &self.templates[k * cells..(k + 1) * cells]
    }

    fn template_mut(&mut self, k: usize) -> &mut [f32] {
        let cells = self.cells();
        &mut self.templates[k * cells..(k + 1) * cells]
    }

    /// Template k scaled to sum to 1. A zero template (empty cluster)
    /// yields the zero map, the same convention as zero-marginal bins.
    pub fn normalized_template(&self, k: usize) -> Vec<f32> {
        let template = self.template(k);
        let total: f64 = template.iter().map(|&v| v as f64).sum();
        if total > 0.0 {
            let inv = (1.0 / total) as f32;
            template.iter().map(|&v| v * inv).collect()
        } else {
            vec![0.0; template.len()]
        }
    }

    /// A codebook with every template normalized.
    pub fn normalized(&self) -> Codebook {
        let mut templates = Vec::with_capacity(self.templates.len());
        for k in 0..self.num_templates {
            templates.extend_from_slice(&self.normalized_template(k));
        }
        Codebook {
            num_templates: self.num_templates,
            theta_dir_bins: self.theta_dir_bins,
            phi_dir_bins: self.phi_dir_bins,
            templates,
        }
    }

    /// Serialize to the codebook artifact format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.templates.len() * 4);
        bytes.extend_from_slice(CODEBOOK_MAGIC);
        bytes.extend_from_slice(&CODEBOOK_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.num_templates as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.theta_dir_bins as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.phi_dir_bins as u32).to_le_bytes());
        bytes.resize(HEADER_SIZE, 0);
        for &v in &self.templates {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Deserialize from the codebook artifact format.
    pub fn from_bytes(data: &[u8]) -> CodebookResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CodebookError::InvalidArtifact(
                "codebook file too short for header".into(),
            ));
        }
        if &data[0..7] != CODEBOOK_MAGIC {
            return Err(CodebookError::InvalidMagic);
        }
        let version = u32::from_le_bytes(data[7..11].try_into().unwrap());
        if version != CODEBOOK_VERSION {
            return Err(CodebookError::UnsupportedVersion(version));
        }
        let num_templates = u32::from_le_bytes(data[11..15].try_into().unwrap()) as usize;
        let theta_dir_bins = u32::from_le_bytes(data[15..19].try_into().unwrap()) as usize;
        let phi_dir_bins = u32::from_le_bytes(data[19..23].try_into().unwrap()) as usize;

        let expected = num_templates * theta_dir_bins * phi_dir_bins * 4;
        if data.len() < HEADER_SIZE + expected {
            return Err(CodebookError::InvalidArtifact(format!(
                "codebook file truncated: expected {} payload bytes, found {}",
                expected,
                data.len() - HEADER_SIZE
            )));
        }

        let templates: Vec<f32> = data[HEADER_SIZE..HEADER_SIZE + expected]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();

        Ok(Self {
            num_templates,
            theta_dir_bins,
            phi_dir_bins,
            templates,
        })
    }

    /// Load a codebook artifact from disk.
    pub fn load(path: &Path) -> CodebookResult<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Write the codebook artifact to disk.
    pub fn save(&self, path: &Path, overwrite: bool) -> CodebookResult<()> {
        write_atomic(path, &self.to_bytes(), overwrite)?;
        Ok(())
    }

    /// Serialized size in bytes.
    pub fn byte_size(&self) -> usize {
        HEADER_SIZE + self.templates.len() * 4
    }
}

/// Trains a codebook from a table store and a reduced-feature matrix.
pub struct CodebookBuilder<'a> {
    store: &'a TableStore,
    min_marginal: f32,
}

impl<'a> CodebookBuilder<'a> {
    pub fn new(store: &'a TableStore, min_marginal: f32) -> Self {
        Self {
            store,
            min_marginal,
        }
    }

    /// Train the codebook.
    ///
    /// `features` must hold exactly one row per unmasked training bin, in
    /// row-major bin order; any mismatch aborts. Every unmasked bin's raw
    /// angular map is added to exactly one template; clusters that attract
    /// no bin keep an all-zero template.
    pub fn build(&self, features: &Matrix, clusterer: &dyn Clusterer) -> CodebookResult<Codebook> {
        let shape = self.store.shape();
        let mask = self.store.training_mask(self.min_marginal);
        self.store.check_feature_rows(features.rows(), &mask)?;

        // Linear spatial indices of the training bins, in feature-row order.
        let training_bins: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &admitted)| admitted.then_some(i))
            .collect();

        let assignments = clusterer.cluster(features)?;
        if assignments.labels.len() != training_bins.len() {
            return Err(CodebookError::InvalidParams(format!(
                "clusterer produced {} labels for {} training bins",
                assignments.labels.len(),
                training_bins.len()
            )));
        }
        let k = assignments.num_clusters;
        if k == 0 || k > u16::MAX as usize + 1 {
            return Err(CodebookError::InvalidParams(format!(
                "codebook size {} does not fit a u16 index",
                k
            )));
        }
        if let Some(&bad) = assignments.labels.iter().find(|&&l| l >= k) {
            return Err(CodebookError::InvalidParams(format!(
                "cluster label {} out of range for K = {}",
                bad, k
            )));
        }

        // Group training bins by cluster, then accumulate each template
        // from its members. Member order is ascending bin index, so the
        // sum is reproducible.
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (row, &label) in assignments.labels.iter().enumerate() {
            members[label].push(training_bins[row]);
        }

        let cells = shape.angular_cells();
        let template_sums: Vec<Vec<f32>> = members
            .par_iter()
            .map(|bins| {
                let mut sum = vec![0.0f32; cells];
                for &bin in bins {
                    for (acc, &v) in sum.iter_mut().zip(self.store.angular_map_at(bin)) {
                        *acc += v;
                    }
                }
                sum
            })
            .collect();

        let mut codebook = Codebook::new_zeroed(k, shape.angular_dims());
        for (ki, sum) in template_sums.into_iter().enumerate() {
            codebook.template_mut(ki).copy_from_slice(&sum);
        }

        let empty = members.iter().filter(|m| m.is_empty()).count();
        tracing::info!(
            "built codebook: {} templates from {} training bins ({} masked out, {} empty clusters)",
            k,
            training_bins.len(),
            mask.len() - training_bins.len(),
            empty
        );

        Ok(codebook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NearestCentroid;
    use photonpack_core::TableShape;

    /// Four spatial bins with 2x2 angular maps; bin 3 is empty, bin 2 is
    /// low-statistics.
    fn test_store() -> TableStore {
        let shape = TableShape::new(4, 1, 1, 2, 2);
        let counts = vec![
            10.0, 0.0, 0.0, 0.0, // bin 0, marginal 10
            0.0, 20.0, 0.0, 0.0, // bin 1, marginal 20
            0.0, 0.0, 1.0, 0.0, // bin 2, marginal 1 (below threshold)
            0.0, 0.0, 0.0, 0.0, // bin 3, marginal 0
        ];
        TableStore::from_counts(counts, shape).unwrap()
    }

    /// Centroids that send feature 0.0 to cluster 0 and 1.0 to cluster 1.
    fn split_clusterer() -> NearestCentroid {
        NearestCentroid::new(Matrix::new(2, 1, vec![0.0, 1.0]).unwrap())
    }

    #[test]
    fn test_build_accumulates_raw_maps() {
        let store = test_store();
        // Bins 0 and 1 are unmasked at threshold 5; features push bin 0
        // to cluster 0 and bin 1 to cluster 1.
        let features = Matrix::new(2, 1, vec![0.0, 1.0]).unwrap();

        let builder = CodebookBuilder::new(&store, 5.0);
        let codebook = builder.build(&features, &split_clusterer()).unwrap();

        assert_eq!(codebook.num_templates(), 2);
        assert_eq!(codebook.template(0), &[10.0, 0.0, 0.0, 0.0]);
        assert_eq!(codebook.template(1), &[0.0, 20.0, 0.0, 0.0]);
    }

    #[test]
    fn test_masked_bin_contributes_nowhere() {
        let store = test_store();
        let features = Matrix::new(2, 1, vec![0.0, 0.0]).unwrap();

        let builder = CodebookBuilder::new(&store, 5.0);
        let codebook = builder.build(&features, &split_clusterer()).unwrap();

        // Bin 2's count of 1.0 in cell 2 must not appear in any template.
        let total_cell2: f32 = (0..codebook.num_templates())
            .map(|k| codebook.template(k)[2])
            .sum();
        assert_eq!(total_cell2, 0.0);

        // Both unmasked bins landed in cluster 0; cluster 1 stays empty.
        assert_eq!(codebook.template(0), &[10.0, 20.0, 0.0, 0.0]);
        assert_eq!(codebook.template(1), &[0.0; 4]);
    }

    #[test]
    fn test_each_bin_contributes_exactly_once() {
        let store = test_store();
        let features = Matrix::new(2, 1, vec![0.0, 1.0]).unwrap();

        let builder = CodebookBuilder::new(&store, 5.0);
        let codebook = builder.build(&features, &split_clusterer()).unwrap();

        // Sum over all templates equals the sum over unmasked raw maps.
        let template_total: f32 = (0..codebook.num_templates())
            .flat_map(|k| codebook.template(k).iter().copied().collect::<Vec<_>>())
            .sum();
        assert_eq!(template_total, 30.0);
    }

    #[test]
    fn test_feature_row_mismatch_is_fatal() {
        let store = test_store();
        // Three rows, but only two unmasked bins.
        let features = Matrix::new(3, 1, vec![0.0, 1.0, 0.5]).unwrap();

        let builder = CodebookBuilder::new(&store, 5.0);
        let err = builder.build(&features, &split_clusterer()).unwrap_err();
        assert!(matches!(
            err,
            CodebookError::Table(photonpack_table::TableError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_cluster_normalizes_to_zero_map() {
        let codebook = Codebook::new_zeroed(3, [2, 2]);
        let normalized = codebook.normalized_template(1);
        assert_eq!(normalized, vec![0.0; 4]);
        assert!(normalized.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_normalized_template_sums_to_one() {
        let codebook =
            Codebook::from_templates(1, [2, 2], vec![1.0, 1.0, 2.0, 0.0]).unwrap();
        let normalized = codebook.normalized_template(0);
        let total: f32 = normalized.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(normalized, vec![0.25, 0.25, 0.5, 0.0]);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let codebook =
            Codebook::from_templates(2, [1, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let restored = Codebook::from_bytes(&codebook.to_bytes()).unwrap();
        assert_eq!(restored, codebook);
        assert_eq!(codebook.byte_size(), codebook.to_bytes().len());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codebook.ptcbk");

        let codebook = Codebook::from_templates(1, [2, 2], vec![5.0, 0.0, 3.0, 2.0]).unwrap();
        codebook.save(&path, false).unwrap();

        let loaded = Codebook::load(&path).unwrap();
        assert_eq!(loaded, codebook);

        // Second save without overwrite must refuse.
        assert!(codebook.save(&path, false).is_err());
    }

    #[test]
    fn test_build_is_deterministic() {
        let store = test_store();
        let features = Matrix::new(2, 1, vec![0.0, 1.0]).unwrap();
        let builder = CodebookBuilder::new(&store, 5.0);

        let a = builder.build(&features, &split_clusterer()).unwrap();
        let b = builder.build(&features, &split_clusterer()).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
    }
}

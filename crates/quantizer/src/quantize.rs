//! Full-table quantization: assign every spatial-time bin its best
//! codebook template under the chi-squared statistic.

use crate::error::{QuantizeError, QuantizeResult};
use photonpack_codebook::Codebook;
use photonpack_core::distance::chi2_statistic;
use photonpack_core::{QuantizeSettings, TableShape};
use photonpack_table::TableStore;
use rayon::prelude::*;
use std::borrow::Cow;

/// Reserved index for bins with no photons to match.
pub const SENTINEL_INDEX: u16 = 0;

/// The quantized table: one (index, weight, chi2) triple per spatial bin,
/// row-major over (r, theta, t).
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTable {
    pub shape: TableShape,
    pub index: Vec<u16>,
    pub weight: Vec<f32>,
    pub chi2: Vec<f32>,
}

impl QuantizedTable {
    pub fn spatial_dims(&self) -> [usize; 3] {
        self.shape.spatial_dims()
    }
}

/// Quantize every spatial-time bin of the table against the codebook.
///
/// Bins with zero marginal get the sentinel index with zero weight and
/// zero chi2; no search runs for them. Every other bin's normalized map
/// is scored against all K templates and assigned the minimizer, ties to
/// the lowest index. The search reads only immutable shared state and
/// each worker writes its own output cells, so bins are scored in
/// parallel with no observable ordering.
pub fn quantize(
    store: &TableStore,
    codebook: &Codebook,
    settings: &QuantizeSettings,
) -> QuantizeResult<QuantizedTable> {
    let shape = store.shape();
    if codebook.num_templates() == 0 {
        return Err(QuantizeError::EmptyCodebook);
    }
    if codebook.num_templates() > u16::MAX as usize + 1 {
        return Err(QuantizeError::TooManyTemplates {
            templates: codebook.num_templates(),
        });
    }
    if codebook.angular_dims() != shape.angular_dims() {
        return Err(QuantizeError::AngularDimMismatch {
            table: shape.angular_dims(),
            codebook: codebook.angular_dims(),
        });
    }

    // The reference statistic compares normalized maps against the raw
    // template sums; normalizing here is the opt-in self-consistent mode.
    let codebook: Cow<'_, Codebook> = if settings.normalize_templates {
        Cow::Owned(codebook.normalized())
    } else {
        Cow::Borrowed(codebook)
    };

    let bins = shape.spatial_bins();
    let marginals = store.marginal_table();
    let k = codebook.num_templates();

    let fits: Vec<(u16, f32)> = (0..bins)
        .into_par_iter()
        .map(|bin| {
            if marginals[bin] <= 0.0 {
                return (SENTINEL_INDEX, 0.0);
            }

            let map = store.normalized_map_at(bin);
            let mut best_idx = 0usize;
            let mut best_chi2 = f32::MAX;
            for ki in 0..k {
                let chi2 = chi2_statistic(&map, codebook.template(ki));
                if chi2 < best_chi2 {
                    best_chi2 = chi2;
                    best_idx = ki;
                }
            }
            (best_idx as u16, best_chi2)
        })
        .collect();

    let mut index = Vec::with_capacity(bins);
    let mut chi2 = Vec::with_capacity(bins);
    for (idx, c) in fits {
        index.push(idx);
        chi2.push(c);
    }

    let empty = marginals.iter().filter(|&&m| m <= 0.0).count();
    tracing::info!(
        "quantized {} bins against {} templates ({} empty bins)",
        bins,
        k,
        empty
    );

    Ok(QuantizedTable {
        shape,
        index,
        weight: marginals.to_vec(),
        chi2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use photonpack_core::TableShape;
    use rand::prelude::*;

    fn random_store(shape: TableShape, seed: u64) -> TableStore {
        let mut rng = StdRng::seed_from_u64(seed);
        let counts: Vec<f32> = (0..shape.total_cells())
            .map(|_| {
                if rng.gen_bool(0.3) {
                    0.0
                } else {
                    rng.gen_range(0.0..50.0)
                }
            })
            .collect();
        TableStore::from_counts(counts, shape).unwrap()
    }

    fn random_codebook(k: usize, dims: [usize; 2], seed: u64) -> Codebook {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells = dims[0] * dims[1];
        let templates: Vec<f32> = (0..k * cells).map(|_| rng.gen_range(0.0..100.0)).collect();
        Codebook::from_templates(k, dims, templates).unwrap()
    }

    #[test]
    fn test_indices_in_range() {
        let shape = TableShape::new(3, 2, 2, 4, 4);
        let store = random_store(shape, 1);
        let codebook = random_codebook(5, [4, 4], 2);

        let quantized = quantize(&store, &codebook, &QuantizeSettings::default()).unwrap();
        assert_eq!(quantized.index.len(), shape.spatial_bins());
        assert!(quantized.index.iter().all(|&i| (i as usize) < 5));
    }

    #[test]
    fn test_assigned_template_is_true_minimizer() {
        let shape = TableShape::new(3, 2, 2, 4, 4);
        let store = random_store(shape, 3);
        let codebook = random_codebook(7, [4, 4], 4);

        let quantized = quantize(&store, &codebook, &QuantizeSettings::default()).unwrap();

        for bin in 0..shape.spatial_bins() {
            if store.marginal_table()[bin] <= 0.0 {
                continue;
            }
            let map = store.normalized_map_at(bin);
            let assigned = quantized.index[bin] as usize;

            let mut expect_idx = 0usize;
            let mut expect_chi2 = f32::MAX;
            for ki in 0..codebook.num_templates() {
                let chi2 = chi2_statistic(&map, codebook.template(ki));
                assert!(
                    quantized.chi2[bin] <= chi2,
                    "bin {} assigned chi2 {} beats template {} at {}",
                    bin,
                    quantized.chi2[bin],
                    ki,
                    chi2
                );
                if chi2 < expect_chi2 {
                    expect_chi2 = chi2;
                    expect_idx = ki;
                }
            }
            assert_eq!(assigned, expect_idx);
            assert_eq!(quantized.chi2[bin], expect_chi2);
        }
    }

    #[test]
    fn test_zero_marginal_gets_sentinel() {
        let shape = TableShape::new(2, 1, 1, 2, 2);
        let counts = vec![
            0.0, 0.0, 0.0, 0.0, // empty bin
            5.0, 5.0, 0.0, 0.0, // live bin
        ];
        let store = TableStore::from_counts(counts, shape).unwrap();
        // Arbitrary codebook; the sentinel must not depend on its contents.
        let codebook = random_codebook(4, [2, 2], 9);

        let quantized = quantize(&store, &codebook, &QuantizeSettings::default()).unwrap();
        assert_eq!(quantized.index[0], SENTINEL_INDEX);
        assert_eq!(quantized.weight[0], 0.0);
        assert_eq!(quantized.chi2[0], 0.0);
        assert_eq!(quantized.weight[1], 10.0);
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        let shape = TableShape::new(1, 1, 1, 2, 2);
        let store = TableStore::from_counts(vec![4.0, 0.0, 0.0, 0.0], shape).unwrap();

        // Two identical templates; the first must win.
        let codebook =
            Codebook::from_templates(2, [2, 2], vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0])
                .unwrap();

        let quantized = quantize(&store, &codebook, &QuantizeSettings::default()).unwrap();
        assert_eq!(quantized.index[0], 0);
    }

    #[test]
    fn test_weight_equals_marginal() {
        let shape = TableShape::new(2, 2, 1, 2, 2);
        let store = random_store(shape, 5);
        let codebook = random_codebook(3, [2, 2], 6);

        let quantized = quantize(&store, &codebook, &QuantizeSettings::default()).unwrap();
        assert_eq!(quantized.weight, store.marginal_table());
    }

    #[test]
    fn test_normalized_mode_matches_identical_shape() {
        let shape = TableShape::new(1, 1, 1, 2, 2);
        // The bin's distribution is proportional to template 1, so under
        // normalized comparison its chi2 must be exactly zero.
        let store = TableStore::from_counts(vec![2.0, 4.0, 6.0, 8.0], shape).unwrap();
        let codebook = Codebook::from_templates(
            2,
            [2, 2],
            vec![
                50.0, 0.0, 0.0, 0.0, // unrelated shape
                1.0, 2.0, 3.0, 4.0, // same shape as the bin
            ],
        )
        .unwrap();

        let settings = QuantizeSettings {
            normalize_templates: true,
        };
        let quantized = quantize(&store, &codebook, &settings).unwrap();
        assert_eq!(quantized.index[0], 1);
        assert!(quantized.chi2[0].abs() < 1e-6);
    }

    #[test]
    fn test_quantize_is_deterministic() {
        let shape = TableShape::new(3, 2, 2, 3, 3);
        let store = random_store(shape, 11);
        let codebook = random_codebook(6, [3, 3], 12);

        let a = quantize(&store, &codebook, &QuantizeSettings::default()).unwrap();
        let b = quantize(&store, &codebook, &QuantizeSettings::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let shape = TableShape::new(1, 1, 1, 2, 2);
        let store = TableStore::from_counts(vec![1.0; 4], shape).unwrap();
        let codebook = random_codebook(2, [3, 3], 1);

        assert!(matches!(
            quantize(&store, &codebook, &QuantizeSettings::default()),
            Err(QuantizeError::AngularDimMismatch { .. })
        ));
    }
}

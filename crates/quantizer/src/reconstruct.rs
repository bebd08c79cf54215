//! Reconstruction of approximate angular maps from the compact encoding.

use crate::error::{QuantizeError, QuantizeResult};
use photonpack_codebook::Codebook;

/// Approximate raw angular map of one bin: `weight * normalize(template)`.
///
/// Sentinel records (weight 0) reconstruct to the zero map, as does any
/// record pointing at an empty template. An index outside the codebook is
/// an error; template maps only ever carry indices below K, so hitting it
/// means the map and codebook artifacts do not belong together.
pub fn reconstruct_bin(codebook: &Codebook, index: u16, weight: f32) -> QuantizeResult<Vec<f32>> {
    if index as usize >= codebook.num_templates() {
        return Err(QuantizeError::InvalidTemplateIndex {
            index,
            templates: codebook.num_templates(),
        });
    }

    let mut map = codebook.normalized_template(index as usize);
    for v in &mut map {
        *v *= weight;
    }
    Ok(map)
}

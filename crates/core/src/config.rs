//! Run configuration for the compression pipeline.
//!
//! A [`CompressionConfig`] is built once at startup and passed by reference
//! into each pipeline stage; nothing reads configuration from ambient state.

use serde::{Deserialize, Serialize};

/// Master configuration for one compression run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Codebook training settings.
    #[serde(default)]
    pub templates: TemplateSettings,

    /// Training-mask settings.
    #[serde(default)]
    pub mask: MaskSettings,

    /// Quantization-pass settings.
    #[serde(default)]
    pub quantize: QuantizeSettings,
}

/// Codebook training settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSettings {
    /// Number of templates in the codebook (K). Must fit a u16 index.
    pub num_templates: usize,

    /// Maximum k-means iterations.
    pub max_iterations: usize,

    /// K-means convergence threshold (fraction of bins that changed
    /// cluster between iterations).
    pub convergence_threshold: f64,

    /// Random seed for k-means initialization. Runs are bit-reproducible
    /// only when this is set.
    pub seed: Option<u64>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            num_templates: 4000,
            max_iterations: 20,
            convergence_threshold: 0.001,
            seed: None,
        }
    }
}

/// Training-mask settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskSettings {
    /// Minimum per-bin marginal (total photon count) for a bin to enter
    /// codebook training. Low-statistics bins carry shapes that are mostly
    /// sampling noise and are kept out of the template library.
    pub min_marginal: f32,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            min_marginal: 1000.0,
        }
    }
}

/// Quantization-pass settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantizeSettings {
    /// Normalize templates before the chi-squared search.
    ///
    /// The reference pipeline compares each bin's normalized map against
    /// the raw summed templates; `false` reproduces that numeric behavior
    /// bin-for-bin. `true` normalizes every template once up front, which
    /// is the statistically self-consistent variant.
    pub normalize_templates: bool,
}

impl CompressionConfig {
    /// Set the codebook size.
    pub fn with_num_templates(mut self, k: usize) -> Self {
        self.templates.num_templates = k;
        self
    }

    /// Set the k-means seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.templates.seed = Some(seed);
        self
    }

    /// Set the k-means iteration budget.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.templates.max_iterations = iterations;
        self
    }

    /// Set the training-mask threshold.
    pub fn with_min_marginal(mut self, min_marginal: f32) -> Self {
        self.mask.min_marginal = min_marginal;
        self
    }

    /// Normalize templates before the chi-squared search.
    pub fn with_normalized_templates(mut self) -> Self {
        self.quantize.normalize_templates = true;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.templates.num_templates == 0 {
            return Err("num_templates must be > 0".to_string());
        }
        if self.templates.num_templates > u16::MAX as usize + 1 {
            return Err(format!(
                "num_templates {} does not fit a u16 index (max {})",
                self.templates.num_templates,
                u16::MAX as usize + 1
            ));
        }
        if self.templates.max_iterations == 0 {
            return Err("max_iterations must be > 0".to_string());
        }
        if self.templates.convergence_threshold < 0.0 {
            return Err("convergence_threshold must be >= 0".to_string());
        }
        if !self.mask.min_marginal.is_finite() || self.mask.min_marginal < 0.0 {
            return Err("min_marginal must be finite and >= 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CompressionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.templates.num_templates, 4000);
        assert!(!config.quantize.normalize_templates);
    }

    #[test]
    fn test_builder_pattern() {
        let config = CompressionConfig::default()
            .with_num_templates(256)
            .with_seed(42)
            .with_max_iterations(5)
            .with_min_marginal(100.0)
            .with_normalized_templates();

        assert_eq!(config.templates.num_templates, 256);
        assert_eq!(config.templates.seed, Some(42));
        assert_eq!(config.templates.max_iterations, 5);
        assert_eq!(config.mask.min_marginal, 100.0);
        assert!(config.quantize.normalize_templates);
    }

    #[test]
    fn test_validation_rejects_bad_k() {
        assert!(CompressionConfig::default()
            .with_num_templates(0)
            .validate()
            .is_err());
        assert!(CompressionConfig::default()
            .with_num_templates(65536)
            .validate()
            .is_ok());
        assert!(CompressionConfig::default()
            .with_num_templates(65537)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let mut config = CompressionConfig::default();
        config.mask.min_marginal = f32::NAN;
        assert!(config.validate().is_err());
        config.mask.min_marginal = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization() {
        let config = CompressionConfig::default().with_seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CompressionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.templates.seed, Some(7));
        assert_eq!(parsed.mask.min_marginal, config.mask.min_marginal);
    }
}

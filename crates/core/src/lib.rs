//! Core types, distance kernels, and run configuration for the photonpack
//! table compressor.

pub mod config;
pub mod distance;
pub mod types;

pub use config::{CompressionConfig, MaskSettings, QuantizeSettings, TemplateSettings};
pub use distance::{chi2_statistic, l2_distance, l2_distance_squared};
pub use types::{Bin3, Bin5, TableShape};

//! The quantization pass: per-bin nearest-template search over the full
//! table, and reconstruction of approximate angular maps from the compact
//! encoding.

pub mod error;
pub mod quantize;
pub mod reconstruct;

pub use error::{QuantizeError, QuantizeResult};
pub use quantize::{quantize, QuantizedTable, SENTINEL_INDEX};
pub use reconstruct::reconstruct_bin;

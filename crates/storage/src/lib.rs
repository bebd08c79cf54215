//! Artifact storage for the photonpack pipeline.
//!
//! Every artifact is a little-endian binary file with a 7-byte magic, a
//! `u32` format version, and a header padded so the payload stays 4-byte
//! aligned:
//!
//! ```text
//! raw table     "PTTAB1\0"  5 x u32 bin counts, padded to 32 bytes; f32 counts
//! matrix        "PTMAT1\0"  rows, cols u32, padded to 24 bytes; f32 row-major
//! template map  "PTMAP1\0"  3 x u32 bin counts, padded to 24 bytes;
//!                           6-byte records (index: u16, weight: f32)
//! chi2 table    "PTCHI1\0"  3 x u32 bin counts, padded to 24 bytes; f32
//! ```
//!
//! Inputs are read through memory maps; outputs are streamed to a `.tmp`
//! sibling and atomically renamed into place. A destination that already
//! exists is refused unless the caller passes an explicit overwrite
//! directive, so re-running a batch job never clobbers finished artifacts
//! by accident.

pub mod artifact;
pub mod chi2_file;
pub mod error;
pub mod matrix;
pub mod table_file;
pub mod template_map;

pub use artifact::{ensure_writable, write_atomic, write_atomic_with};
pub use chi2_file::{read_chi2_table, write_chi2_table};
pub use error::{StorageError, StorageResult};
pub use matrix::Matrix;
pub use table_file::{write_table, LoadedTable};
pub use template_map::{encode_records, write_template_map, LoadedTemplateMap, RECORD_SIZE};

//! Quantizer error types.

use thiserror::Error;

/// Quantization errors.
#[derive(Error, Debug)]
pub enum QuantizeError {
    #[error("angular dimensions mismatch: table has {table:?}, codebook {codebook:?}")]
    AngularDimMismatch {
        table: [usize; 2],
        codebook: [usize; 2],
    },

    #[error("codebook is empty")]
    EmptyCodebook,

    #[error("codebook has {templates} templates, more than a u16 index can address")]
    TooManyTemplates { templates: usize },

    #[error("template index {index} out of range for codebook of {templates} templates")]
    InvalidTemplateIndex { index: u16, templates: usize },
}

pub type QuantizeResult<T> = Result<T, QuantizeError>;

//! Error types for delta parsing and algebra.

use thiserror::Error;

/// Structured error types for editor deltas.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DeltaError {
    /// A JSON operation did not match any of the insert, retain or delete shapes
    #[error("Invalid delta operation: {reason}")]
    InvalidOp { reason: String },

    /// A document-only operation (such as diff) was given a change delta
    #[error("Delta is not a document: {reason}")]
    NotADocument { reason: String },
}

impl DeltaError {
    /// Check if this error came from parsing an operation
    pub fn is_invalid_op(&self) -> bool {
        matches!(self, DeltaError::InvalidOp { .. })
    }

    /// Check if this error came from a document-only operation
    pub fn is_not_a_document(&self) -> bool {
        matches!(self, DeltaError::NotADocument { .. })
    }
}

impl From<DeltaError> for crate::Error {
    fn from(err: DeltaError) -> Self {
        crate::Error::Delta(err)
    }
}

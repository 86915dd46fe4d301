//! Error types for embed definitions.

use thiserror::Error;

/// Axis of a table a cell address refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Column,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Row => f.write_str("row"),
            Axis::Column => f.write_str("column"),
        }
    }
}

/// Errors raised while writing an embed patch into the document.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The patch could not be interpreted for this embed.
    #[error("Malformed {embed} patch: {reason}")]
    MalformedPatch { embed: String, reason: String },

    /// A cell key names a position that has no identity on its axis.
    #[error("Cell {key} points outside the table's {axis}s")]
    CellAddress { key: String, axis: Axis },

    /// A row or column item was stored without an identity.
    #[error("Line item without identity: {axis} at position {position}")]
    MissingIdentity { axis: Axis, position: u32 },
}

impl EmbedError {
    pub fn is_malformed_patch(&self) -> bool {
        matches!(self, EmbedError::MalformedPatch { .. })
    }

    pub fn is_cell_address(&self) -> bool {
        matches!(self, EmbedError::CellAddress { .. })
    }

    pub fn is_missing_identity(&self) -> bool {
        matches!(self, EmbedError::MissingIdentity { .. })
    }
}

impl From<EmbedError> for crate::Error {
    fn from(err: EmbedError) -> Self {
        crate::Error::Embed(err)
    }
}

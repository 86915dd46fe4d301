//! Error types for the binding's host-facing entry points.

use thiserror::Error;

/// Errors returned to the host. Problems inside a change are logged and
/// absorbed instead; these only cover calls the binding can't serve.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BindingError {
    /// The binding was destroyed and no longer observes anything
    #[error("Binding has been destroyed")]
    Destroyed,

    /// The document counts offsets in something other than UTF-16 code units
    #[error("Document must use UTF-16 offsets, found {found}")]
    UnsupportedOffsetKind { found: String },

    /// A remote update could not be decoded
    #[error("Failed to decode update: {reason}")]
    UpdateDecode { reason: String },

    /// A decoded update could not be integrated
    #[error("Failed to apply update: {reason}")]
    UpdateApply { reason: String },
}

impl BindingError {
    /// Check if the binding was used after being destroyed
    pub fn is_destroyed(&self) -> bool {
        matches!(self, BindingError::Destroyed)
    }

    /// Check if the document was created with the wrong offset kind
    pub fn is_unsupported_offset_kind(&self) -> bool {
        matches!(self, BindingError::UnsupportedOffsetKind { .. })
    }

    /// Check if a remote update was rejected
    pub fn is_update_error(&self) -> bool {
        matches!(
            self,
            BindingError::UpdateDecode { .. } | BindingError::UpdateApply { .. }
        )
    }
}

impl From<BindingError> for crate::Error {
    fn from(err: BindingError) -> Self {
        crate::Error::Binding(err)
    }
}

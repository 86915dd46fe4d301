//!
//! yquill: keeps a rich-text editor and a `yrs` shared text in sync.
//!
//! ## Core Concepts
//!
//! * **Deltas (`delta::Delta`)**: The editor's document and change format, an ordered list of insert, retain and delete operations, with the usual algebra (compose, transform, invert, diff).
//! * **Embeds (`embed::EmbedDefinition`)**: Object-valued content such as tables. Registered embeds are stored as structured shared types so that concurrent edits inside them merge; anything else is stored as a plain value.
//! * **Editors (`editor::Editor`)**: The editor collaborator. `editor::MemoryEditor` is a headless implementation.
//! * **Presence (`presence::Awareness`)**: Per-peer cursors and user metadata, rendered as labelled remote cursors.
//! * **Bindings (`binding::Binding`)**: The orchestrator. Local edits are written into the shared text in origin-tagged transactions, and document changes from everyone else are replayed into the editor.
//!
//! ```
//! use yrs::{Doc, OffsetKind, Options};
//! use yquill::binding::{Binding, BindingOptions};
//! use yquill::delta::Delta;
//! use yquill::editor::{Editor, MemoryEditor};
//!
//! let doc = Doc::with_options(Options {
//!     offset_kind: OffsetKind::Utf16,
//!     ..Default::default()
//! });
//! let text = doc.get_or_insert_text("quill");
//! let binding = Binding::new(&doc, text, MemoryEditor::new(), None, BindingOptions::default())?;
//!
//! let mut change = Delta::new();
//! change.insert("Hello");
//! binding.apply_local(&change)?;
//! assert_eq!(binding.editor().contents().text(), "Hello\n");
//! # Ok::<(), yquill::Error>(())
//! ```

pub mod binding;
pub mod convert;
pub mod delta;
pub mod editor;
pub mod embed;
pub mod position;
pub mod presence;

/// Re-export the `Binding` struct for easier access.
pub use binding::Binding;

/// `yrs` types re-exported so hosts don't need a separate dependency.
pub mod y_crdt {
    pub use yrs::*;
}

/// Result type used throughout the yquill library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the yquill library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured delta errors from the delta module
    #[error(transparent)]
    Delta(delta::DeltaError),

    /// Structured embed errors from the embed module
    #[error(transparent)]
    Embed(embed::EmbedError),

    /// Structured binding errors from the binding module
    #[error(transparent)]
    Binding(binding::BindingError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Serialize(_) => "serialize",
            Error::Delta(_) => "delta",
            Error::Embed(_) => "embed",
            Error::Binding(_) => "binding",
        }
    }

    /// Check if this error came from input that could not be interpreted.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Error::Serialize(_) => true,
            Error::Delta(delta_err) => delta_err.is_invalid_op(),
            Error::Embed(embed_err) => embed_err.is_malformed_patch() || embed_err.is_cell_address(),
            Error::Binding(binding_err) => binding_err.is_update_error(),
        }
    }

    /// Check if this error means the binding can no longer be used.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Error::Binding(binding_err) if binding_err.is_destroyed())
    }
}

//! The editor a binding drives.

use serde::{Deserialize, Serialize};

use crate::binding::OriginToken;
use crate::delta::Delta;
use crate::presence::CursorRenderer;

mod memory;

pub use memory::MemoryEditor;

/// A selected range in UTF-16 code units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub index: usize,
    pub length: usize,
}

impl Selection {
    pub fn new(index: usize, length: usize) -> Self {
        Self { index, length }
    }

    pub fn caret(index: usize) -> Self {
        Self { index, length: 0 }
    }

    pub fn end(&self) -> usize {
        self.index + self.length
    }
}

/// Who caused an editor change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSource {
    /// Typing, pasting and other interactive edits.
    User,
    /// Programmatic edits by the host.
    Api,
    /// A change written by the binding holding this token.
    Binding(OriginToken),
}

impl ChangeSource {
    pub fn is_binding(&self, token: &OriginToken) -> bool {
        matches!(self, ChangeSource::Binding(own) if own == token)
    }
}

/// A rich-text editor whose content is a document delta.
pub trait Editor: Send {
    /// Apply a change and return the change the editor actually made.
    fn update_contents(&mut self, change: &Delta, source: &ChangeSource) -> Delta;

    /// Replace the whole content and return the change made.
    fn set_contents(&mut self, contents: &Delta, source: &ChangeSource) -> Delta;

    fn contents(&self) -> Delta;

    fn length(&self) -> usize;

    fn selection(&self) -> Option<Selection>;

    /// Where remote cursors are drawn, if the editor shows them.
    fn cursors(&mut self) -> Option<&mut dyn CursorRenderer> {
        None
    }
}

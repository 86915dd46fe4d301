//! Translation between editor offsets and positions that survive
//! concurrent edits.

use yrs::branch::{Branch, BranchPtr};
use yrs::{Assoc, IndexedSequence, ReadTxn, StickyIndex, Text, TextRef};

use crate::editor::Selection;
use crate::presence::CursorState;

/// A position in `text` that follows the content at `offset`.
///
/// Offsets past the end are clamped to the end of the text. The end itself
/// has no content to follow: a root text is anchored to its end, which keeps
/// the position behind anything appended later, and a nested text sticks to
/// its last character.
pub fn compute_relative<T: ReadTxn>(txn: &T, text: &TextRef, offset: usize) -> Option<StickyIndex> {
    let len = text.len(txn);
    let offset = u32::try_from(offset).unwrap_or(u32::MAX).min(len);
    if offset < len {
        return text.sticky_index(txn, offset, Assoc::After);
    }
    let end = StickyIndex::from_type(txn, text, Assoc::After);
    if len == 0 || end.is_root() {
        Some(end)
    } else {
        text.sticky_index(txn, len, Assoc::Before)
    }
}

/// The current offset of `position`, or `None` when it no longer points
/// into `text`.
pub fn resolve_absolute<T: ReadTxn>(txn: &T, text: &TextRef, position: &StickyIndex) -> Option<usize> {
    let offset = position.get_offset(txn)?;
    let branch: &Branch = text.as_ref();
    if offset.branch == BranchPtr::from(branch) {
        Some(offset.index as usize)
    } else {
        None
    }
}

/// Both ends of a cursor as a selection, or `None` if either end is gone.
pub fn resolve_selection<T: ReadTxn>(txn: &T, text: &TextRef, cursor: &CursorState) -> Option<Selection> {
    let anchor = resolve_absolute(txn, text, &cursor.anchor)?;
    let head = resolve_absolute(txn, text, &cursor.head)?;
    Some(Selection::new(anchor.min(head), anchor.abs_diff(head)))
}

/// A cursor for `selection`, anchored at its start.
pub fn relative_selection<T: ReadTxn>(txn: &T, text: &TextRef, selection: Selection) -> Option<CursorState> {
    let anchor = compute_relative(txn, text, selection.index)?;
    let head = compute_relative(txn, text, selection.index + selection.length)?;
    Some(CursorState { anchor, head })
}

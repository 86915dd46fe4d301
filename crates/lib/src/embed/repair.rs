//! Document repairs found while reading embeds.
//!
//! Observers run inside the transaction that produced their events and may
//! not write to it, so anything that needs fixing is queued here and applied
//! later in a transaction of its own.

use std::collections::HashSet;

use tracing::debug;
use yrs::types::text::{Diff, YChange};
use yrs::{Any, Map, MapRef, Out, ReadTxn, Text, TextRef, TransactionMut};

/// A single queued write.
#[derive(Debug, Clone)]
pub enum Repair {
    /// Remove an entry that nothing refers to any more.
    RemoveEntry { map: MapRef, key: String },
    /// Remove every item of a row or column line whose identity already
    /// appeared earlier in the line.
    RemoveDuplicateIds { line: TextRef },
}

impl Repair {
    fn apply(self, txn: &mut TransactionMut) {
        match self {
            Repair::RemoveEntry { map, key } => {
                if map.remove(txn, &key).is_some() {
                    debug!(key = %key, "removed orphaned entry");
                }
            }
            Repair::RemoveDuplicateIds { line } => {
                let duplicates = duplicate_positions(&*txn, &line);
                // Right to left keeps the remaining positions valid.
                for position in duplicates.into_iter().rev() {
                    line.remove_range(txn, position, 1);
                    debug!(position, "removed duplicate line identity");
                }
            }
        }
    }
}

/// Positions of items whose `id` already appeared earlier in the line.
pub(crate) fn duplicate_positions<T: ReadTxn>(txn: &T, line: &TextRef) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let mut position = 0u32;
    for Diff { insert, .. } in line.diff(txn, YChange::identity) {
        if let Some(id) = line_item_id(&insert) {
            if !seen.insert(id) {
                duplicates.push(position);
            }
        }
        position += item_len(&insert);
    }
    duplicates
}

pub(crate) fn line_item_id(item: &Out) -> Option<String> {
    match item {
        Out::Any(Any::Map(map)) => match map.get("id") {
            Some(Any::String(id)) => Some(id.to_string()),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn item_len(item: &Out) -> u32 {
    match item {
        Out::Any(Any::String(text)) => crate::delta::utf16_len(text) as u32,
        _ => 1,
    }
}

/// Writes queued during a read, applied later by [`Repairs::apply`].
#[derive(Debug, Default)]
pub struct Repairs {
    queue: Vec<Repair>,
}

impl Repairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, repair: Repair) {
        self.queue.push(repair);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Move every queued repair out of `other` into this queue.
    pub fn append(&mut self, other: &mut Repairs) {
        self.queue.append(&mut other.queue);
    }

    /// Apply all queued repairs. Each one re-reads the document first, so a
    /// repair that a peer already made is a no-op.
    pub fn apply(self, txn: &mut TransactionMut) {
        for repair in self.queue {
            repair.apply(txn);
        }
    }
}

//! Tables stored as shared types.
//!
//! ```text
//! element
//! ├── rows:    text of {id} embeds, formatted with row attributes
//! ├── columns: text of {id} embeds, formatted with column attributes
//! └── cells:   map "rowId:columnId" -> { content: text, attributes: map }
//! ```
//!
//! The editor addresses cells by 1-based position (`"2:3"`), the document by
//! the identities of their row and column, so cells follow their row and
//! column through concurrent moves. Cells whose row or column is gone are
//! left out of every read and collected afterwards.
//!
//! Cell removals are not forwarded: the only writer of removals is the
//! orphan collection, and an orphaned cell was never shown to the editor or
//! already left it with its row or column. Cells replaced by a concurrent
//! first write are left to the binding's diff against the document, as are
//! duplicate rows and columns that move a cell to the surviving copy.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;
use yrs::types::text::{Diff, YChange};
use yrs::types::{EntryChange, Event};
use yrs::{Any, Map, MapRef, Out, ReadTxn, Text, TextRef, TransactionMut};

use super::{
    Axis, EmbedDefinition, EmbedError, Repair, Repairs, ScopedEvent, get_map, get_or_insert_map,
    get_or_insert_text, get_text, item_len, line_item_id,
};
use crate::convert;
use crate::delta::table::{CellData, TABLE_EMBED, TableData, parse_cell_identity, stringify_cell_identity};
use crate::delta::{AttributeMap, Delta, Embed, InsertValue, Op};

const ROWS: &str = "rows";
const COLUMNS: &str = "columns";
const CELLS: &str = "cells";
const CONTENT: &str = "content";
const ATTRIBUTES: &str = "attributes";

/// Embed definition for `{"table-embed": {...}}` inserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEmbed;

/// Identities of one axis by position.
///
/// Only the first occurrence of an identity is addressable; later copies
/// resolve to nothing and are queued for removal.
#[derive(Debug, Default)]
struct LineIndex {
    ids: Vec<Option<String>>,
    first: HashMap<String, usize>,
    missing: Vec<u32>,
}

impl LineIndex {
    fn scan<T: ReadTxn>(txn: &T, line: Option<&TextRef>, axis: Axis, repairs: &mut Repairs) -> Self {
        let mut index = LineIndex::default();
        let Some(line) = line else {
            return index;
        };
        let mut duplicated = false;
        let mut position = 0u32;
        for Diff { insert, .. } in line.diff(txn, YChange::identity) {
            let len = item_len(&insert);
            match line_item_id(&insert) {
                Some(id) if !index.first.contains_key(&id) => {
                    index.first.insert(id.clone(), index.ids.len());
                    index.ids.push(Some(id));
                }
                Some(id) => {
                    debug!(%axis, id = %id, position, "duplicate identity");
                    duplicated = true;
                    index.ids.push(None);
                }
                None => {
                    error!(%axis, position, "line item without identity");
                    index.missing.push(position);
                    index.ids.extend((0..len).map(|_| None));
                }
            }
            position += len;
        }
        if duplicated {
            repairs.push(Repair::RemoveDuplicateIds { line: line.clone() });
        }
        index
    }

    fn id_at(&self, position: usize) -> Option<&str> {
        self.ids.get(position).and_then(|id| id.as_deref())
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.first.get(id).copied()
    }
}

/// Both axes of a table, for translating cell keys.
struct CellIndex {
    rows: LineIndex,
    columns: LineIndex,
}

impl CellIndex {
    fn scan<T: ReadTxn>(txn: &T, element: &MapRef, repairs: &mut Repairs) -> Self {
        let rows = get_text(txn, element, ROWS);
        let columns = get_text(txn, element, COLUMNS);
        CellIndex {
            rows: LineIndex::scan(txn, rows.as_ref(), Axis::Row, repairs),
            columns: LineIndex::scan(txn, columns.as_ref(), Axis::Column, repairs),
        }
    }

    /// `"2:3"` to `"rowId:columnId"`.
    fn to_document(&self, key: &str) -> Result<String, EmbedError> {
        let (row, column) = parse_cell_identity(key).ok_or_else(|| EmbedError::MalformedPatch {
            embed: TABLE_EMBED.to_string(),
            reason: format!("invalid cell key {key:?}"),
        })?;
        let row_id = self.rows.id_at(row).ok_or_else(|| EmbedError::CellAddress {
            key: key.to_string(),
            axis: Axis::Row,
        })?;
        let column_id = self.columns.id_at(column).ok_or_else(|| EmbedError::CellAddress {
            key: key.to_string(),
            axis: Axis::Column,
        })?;
        Ok(format!("{row_id}:{column_id}"))
    }

    /// `"rowId:columnId"` to `"2:3"`, or `None` for an orphaned cell.
    fn to_editor(&self, key: &str) -> Option<String> {
        let (row_id, column_id) = key.split_once(':')?;
        let row = self.rows.position_of(row_id)?;
        let column = self.columns.position_of(column_id)?;
        Some(stringify_cell_identity(row, column))
    }
}

/// Give every inserted line item an identity.
fn with_identities(change: &Delta) -> Delta {
    change
        .ops
        .iter()
        .map(|op| match op {
            Op::Insert { value, attributes } => {
                let identified = matches!(
                    value,
                    InsertValue::Embed(Embed { name, data }) if name == "id" && data.is_string()
                );
                let value = if identified {
                    value.clone()
                } else {
                    InsertValue::Embed(Embed::new("id", Value::String(Uuid::new_v4().to_string())))
                };
                Op::Insert {
                    value,
                    attributes: attributes.clone(),
                }
            }
            other => other.clone(),
        })
        .collect()
}

fn write_cell(txn: &mut TransactionMut, cells: &MapRef, key: &str, patch: &CellData) {
    let cell = get_or_insert_map(txn, cells, key);
    let content = get_or_insert_text(txn, &cell, CONTENT);
    let attributes = get_or_insert_map(txn, &cell, ATTRIBUTES);
    for (name, value) in patch.attributes.iter().flatten() {
        if value.is_null() {
            attributes.remove(txn, name);
        } else {
            attributes.insert(txn, name.as_str(), convert::json_to_any(value));
        }
    }
    if !patch.content.is_empty() {
        convert::apply_delta(txn, &content, &patch.content);
    }
}

fn read_cell<T: ReadTxn>(txn: &T, cell: &MapRef) -> Option<CellData> {
    let content = get_text(txn, cell, CONTENT)
        .map(|text| convert::text_content(txn, &text))
        .unwrap_or_default();
    let attributes: AttributeMap = get_map(txn, cell, ATTRIBUTES)
        .map(|map| {
            map.iter(txn)
                .map(|(name, value)| (name.to_string(), convert::out_to_json(&value)))
                .collect()
        })
        .unwrap_or_default();
    CellData::compact(content, Some(attributes))
}

fn cell_attribute_changes(changes: &HashMap<std::sync::Arc<str>, EntryChange>) -> AttributeMap {
    changes
        .iter()
        .map(|(name, change)| {
            let value = convert::entry_change_value(change)
                .map(convert::out_to_json)
                .unwrap_or(Value::Null);
            (name.to_string(), value)
        })
        .collect()
}

fn to_payload(table: &TableData) -> Value {
    serde_json::to_value(table).unwrap_or_else(|err| {
        error!(%err, "failed to serialize table");
        Value::Null
    })
}

impl EmbedDefinition for TableEmbed {
    fn update(
        &self,
        txn: &mut TransactionMut,
        element: &MapRef,
        patch: &Value,
        repairs: &mut Repairs,
    ) -> Result<(), EmbedError> {
        let patch: TableData =
            serde_json::from_value(patch.clone()).map_err(|err| EmbedError::MalformedPatch {
                embed: TABLE_EMBED.to_string(),
                reason: err.to_string(),
            })?;

        let rows = get_or_insert_text(txn, element, ROWS);
        let columns = get_or_insert_text(txn, element, COLUMNS);
        let cells = get_or_insert_map(txn, element, CELLS);
        convert::apply_delta(txn, &rows, &with_identities(&patch.rows));
        convert::apply_delta(txn, &columns, &with_identities(&patch.columns));

        // Cell keys in the patch are positions after the line changes.
        let index = CellIndex::scan(&*txn, element, repairs);
        let mut first_error = index
            .rows
            .missing
            .first()
            .map(|&position| EmbedError::MissingIdentity {
                axis: Axis::Row,
                position,
            })
            .or_else(|| {
                index
                    .columns
                    .missing
                    .first()
                    .map(|&position| EmbedError::MissingIdentity {
                        axis: Axis::Column,
                        position,
                    })
            });

        for (key, cell) in &patch.cells {
            match index.to_document(key) {
                Ok(document_key) => write_cell(txn, &cells, &document_key, cell),
                Err(err) => {
                    warn!(%err, "dropping cell patch");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn events_to_delta(
        &self,
        txn: &TransactionMut,
        element: &MapRef,
        events: &[ScopedEvent<'_>],
        repairs: &mut Repairs,
    ) -> Value {
        let mut table = TableData::default();
        // Cells whose whole content goes to the editor.
        let mut replaced: BTreeSet<String> = BTreeSet::new();
        let mut contents: BTreeMap<String, Delta> = BTreeMap::new();
        let mut attributes: BTreeMap<String, AttributeMap> = BTreeMap::new();

        for scoped in events {
            let Some(keys) = scoped.keys() else {
                warn!(path = ?scoped.path, "ignoring indexed path inside table");
                continue;
            };
            match (keys.as_slice(), scoped.event) {
                ([ROWS], Event::Text(event)) => table.rows = convert::event_delta(event.delta(txn)),
                ([COLUMNS], Event::Text(event)) => {
                    table.columns = convert::event_delta(event.delta(txn))
                }
                ([CELLS], Event::Map(event)) => {
                    for (key, change) in event.keys(txn) {
                        match change {
                            EntryChange::Inserted(_) => {
                                replaced.insert(key.to_string());
                            }
                            // A concurrent first write won. What the editor
                            // holds for the cell can't be read from here, so
                            // the binding diffs it against the document.
                            EntryChange::Updated(..) => debug!(key = %key, "cell replaced"),
                            EntryChange::Removed(_) => debug!(key = %key, "cell removed"),
                        }
                    }
                }
                ([CELLS, key], Event::Map(_)) => {
                    replaced.insert(key.to_string());
                }
                ([CELLS, key, CONTENT], Event::Text(event)) => {
                    contents.insert(key.to_string(), convert::event_delta(event.delta(txn)));
                }
                ([CELLS, key, ATTRIBUTES], Event::Map(event)) => {
                    attributes.insert(key.to_string(), cell_attribute_changes(event.keys(txn)));
                }
                ([], Event::Map(event)) => {
                    // Parts created by a peer after the element itself.
                    for key in event.keys(txn).keys() {
                        match key.as_ref() {
                            ROWS => {
                                if let Some(rows) = get_text(txn, element, ROWS) {
                                    table.rows = convert::text_content(txn, &rows);
                                }
                            }
                            COLUMNS => {
                                if let Some(columns) = get_text(txn, element, COLUMNS) {
                                    table.columns = convert::text_content(txn, &columns);
                                }
                            }
                            CELLS => {
                                if let Some(cells) = get_map(txn, element, CELLS) {
                                    replaced.extend(cells.keys(txn).map(str::to_string));
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => warn!(path = ?scoped.path, "ignoring unexpected event inside table"),
            }
        }

        let index = CellIndex::scan(txn, element, repairs);
        let cells = get_map(txn, element, CELLS);
        let mut orphaned = Vec::new();

        for key in &replaced {
            let Some(position) = index.to_editor(key) else {
                orphaned.push(key.clone());
                continue;
            };
            let cell = cells.as_ref().and_then(|cells| get_map(txn, cells, key));
            if let Some(data) = cell.and_then(|cell| read_cell(txn, &cell)) {
                table.cells.insert(position, data);
            }
        }

        let edited: BTreeSet<&String> = contents.keys().chain(attributes.keys()).collect();
        for key in edited {
            if replaced.contains(key) {
                continue;
            }
            let Some(position) = index.to_editor(key) else {
                orphaned.push(key.clone());
                continue;
            };
            let data = CellData {
                content: contents.get(key).cloned().unwrap_or_default(),
                attributes: attributes.get(key).cloned(),
            };
            table.cells.insert(position, data);
        }

        if let Some(cells) = cells {
            for key in orphaned {
                debug!(key = %key, "queueing orphaned cell for removal");
                repairs.push(Repair::RemoveEntry {
                    map: cells.clone(),
                    key,
                });
            }
        }

        to_payload(&table)
    }

    fn diff(&self, current: &Value, target: &Value) -> Option<Value> {
        let current: TableData = serde_json::from_value(current.clone()).ok()?;
        let target: TableData = serde_json::from_value(target.clone()).ok()?;
        match current.diff(&target) {
            Ok(change) => Some(to_payload(&change)),
            Err(err) => {
                warn!(%err, "cannot diff table embed");
                None
            }
        }
    }

    fn type_to_delta(&self, txn: &TransactionMut, element: &MapRef, repairs: &mut Repairs) -> Value {
        let index = CellIndex::scan(txn, element, repairs);
        let mut table = TableData::default();
        if let Some(rows) = get_text(txn, element, ROWS) {
            table.rows = convert::text_content(txn, &rows);
        }
        if let Some(columns) = get_text(txn, element, COLUMNS) {
            table.columns = convert::text_content(txn, &columns);
        }
        if let Some(cells) = get_map(txn, element, CELLS) {
            let mut orphaned = Vec::new();
            for (key, value) in cells.iter(txn) {
                let Some(position) = index.to_editor(key) else {
                    orphaned.push(key.to_string());
                    continue;
                };
                match value {
                    Out::YMap(cell) => {
                        if let Some(data) = read_cell(txn, &cell) {
                            table.cells.insert(position, data);
                        }
                    }
                    Out::Any(Any::Null) => {}
                    _ => warn!(key = %key, "cell is not a map"),
                }
            }
            for key in orphaned {
                debug!(key = %key, "queueing orphaned cell for removal");
                repairs.push(Repair::RemoveEntry {
                    map: cells.clone(),
                    key,
                });
            }
        }
        to_payload(&table)
    }
}

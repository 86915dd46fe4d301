//! Table embed payloads and their algebra.
//!
//! A table patch carries a `rows` line delta, a `columns` line delta and a
//! map of cell patches keyed by `"row:column"`, 1-based and positional. Rows
//! and columns are inserted as `{ "id": .. }` embeds. Cell keys follow the
//! rows and columns around when those are inserted or deleted; a cell whose
//! row or column is deleted is dropped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::handler::{EmbedHandler, parse_payload, to_payload};
use super::iter::{INFINITY, OpIterator};
use super::op::{AttributeMap, OpType};
use super::{Delta, DeltaError, attributes};

/// Embed name of tables.
pub const TABLE_EMBED: &str = "table-embed";

/// Patch or content of a single cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    #[serde(default, skip_serializing_if = "Delta::is_empty")]
    pub content: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,
}

impl CellData {
    /// Drop empty fields; `None` when nothing is left.
    pub fn compact(content: Delta, attributes: Option<AttributeMap>) -> Option<CellData> {
        let content = if content.length() > 0 {
            content
        } else {
            Delta::new()
        };
        let attributes = attributes.filter(|attrs| !attrs.is_empty());
        if content.is_empty() && attributes.is_none() {
            None
        } else {
            Some(CellData {
                content,
                attributes,
            })
        }
    }
}

/// Patch or content of a whole table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default, skip_serializing_if = "Delta::is_empty")]
    pub rows: Delta,
    #[serde(default, skip_serializing_if = "Delta::is_empty")]
    pub columns: Delta,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cells: BTreeMap<String, CellData>,
}

/// Split a `"row:column"` key into 0-based positions.
pub fn parse_cell_identity(identity: &str) -> Option<(usize, usize)> {
    let (row, column) = identity.split_once(':')?;
    let row: usize = row.trim().parse().ok()?;
    let column: usize = column.trim().parse().ok()?;
    Some((row.checked_sub(1)?, column.checked_sub(1)?))
}

/// Build a `"row:column"` key from 0-based positions.
pub fn stringify_cell_identity(row: usize, column: usize) -> String {
    format!("{}:{}", row + 1, column + 1)
}

/// Where position `index` ends up after `delta`, or `None` if it is deleted.
pub fn compose_position(delta: &Delta, index: usize) -> Option<usize> {
    let mut new_index = index;
    let mut iter = OpIterator::new(&delta.ops);
    let mut offset = 0;
    while iter.has_next() && offset <= new_index {
        let length = iter.peek_length();
        let next_type = iter.peek_type();
        iter.next_with_length(INFINITY);
        match next_type {
            OpType::Delete => {
                if length > new_index - offset {
                    return None;
                }
                new_index -= length;
            }
            OpType::Insert => {
                new_index += length;
                offset += length;
            }
            OpType::Retain => offset += length,
        }
    }
    Some(new_index)
}

fn reindex_cells(
    cells: &BTreeMap<String, CellData>,
    rows: &Delta,
    columns: &Delta,
) -> BTreeMap<String, CellData> {
    let mut reindexed = BTreeMap::new();
    for (identity, cell) in cells {
        let Some((row, column)) = parse_cell_identity(identity) else {
            warn!(cell = %identity, "dropping cell with an unparseable key");
            continue;
        };
        if let (Some(row), Some(column)) =
            (compose_position(rows, row), compose_position(columns, column))
        {
            reindexed.insert(stringify_cell_identity(row, column), cell.clone());
        }
    }
    reindexed
}

fn store_cell(cells: &mut BTreeMap<String, CellData>, identity: String, cell: Option<CellData>) {
    match cell {
        Some(cell) => {
            cells.insert(identity, cell);
        }
        None => {
            cells.remove(&identity);
        }
    }
}

impl TableData {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.columns.is_empty() && self.cells.is_empty()
    }

    /// Apply `change` on top of `self`.
    pub fn compose(&self, change: &TableData, keep_null: bool) -> TableData {
        let rows = self.rows.compose(&change.rows);
        let columns = self.columns.compose(&change.columns);
        let mut cells = reindex_cells(&self.cells, &change.rows, &change.columns);
        for (identity, change_cell) in &change.cells {
            let base_cell = cells.get(identity).cloned().unwrap_or_default();
            let content = base_cell.content.compose(&change_cell.content);
            let attributes = attributes::compose(
                base_cell.attributes.as_ref(),
                change_cell.attributes.as_ref(),
                keep_null,
            );
            store_cell(&mut cells, identity.clone(), CellData::compact(content, attributes));
        }
        TableData {
            rows,
            columns,
            cells,
        }
    }

    /// The change that turns table document `self` into `target`.
    ///
    /// Rows and columns are diffed as line documents first; cells are then
    /// compared at their positions after those line changes.
    pub fn diff(&self, target: &TableData) -> Result<TableData, DeltaError> {
        let rows = self.rows.diff(&target.rows)?;
        let columns = self.columns.diff(&target.columns)?;
        let moved = reindex_cells(&self.cells, &rows, &columns);

        let mut cells = BTreeMap::new();
        let identities: BTreeSet<&String> = moved.keys().chain(target.cells.keys()).collect();
        for identity in identities {
            let current = moved.get(identity).cloned().unwrap_or_default();
            let wanted = target.cells.get(identity).cloned().unwrap_or_default();
            let content = current.content.diff(&wanted.content)?;
            let attributes =
                attributes::diff(current.attributes.as_ref(), wanted.attributes.as_ref());
            if let Some(cell) = CellData::compact(content, attributes) {
                cells.insert(identity.clone(), cell);
            }
        }
        Ok(TableData {
            rows,
            columns,
            cells,
        })
    }

    /// Rebase `other` over a concurrent `self`.
    pub fn transform(&self, other: &TableData, priority: bool) -> TableData {
        let rows = self.rows.transform(&other.rows, priority);
        let columns = self.columns.transform(&other.columns, priority);
        let mut cells = reindex_cells(
            &other.cells,
            &other.rows.transform(&self.rows, !priority),
            &other.columns.transform(&self.columns, !priority),
        );
        for (identity, our_cell) in &self.cells {
            let Some((row, column)) = parse_cell_identity(identity) else {
                continue;
            };
            let (Some(row), Some(column)) =
                (compose_position(&rows, row), compose_position(&columns, column))
            else {
                continue;
            };
            let new_identity = stringify_cell_identity(row, column);
            if let Some(other_cell) = cells.get(&new_identity) {
                let content = our_cell.content.transform(&other_cell.content, priority);
                let attributes = attributes::transform(
                    our_cell.attributes.as_ref(),
                    other_cell.attributes.as_ref(),
                    priority,
                );
                store_cell(&mut cells, new_identity, CellData::compact(content, attributes));
            }
        }
        TableData {
            rows,
            columns,
            cells,
        }
    }

    /// The change that undoes `self` applied over `base`.
    pub fn invert(&self, base: &TableData) -> TableData {
        let rows = self.rows.invert(&base.rows);
        let columns = self.columns.invert(&base.columns);
        let mut cells = reindex_cells(&self.cells, &rows, &columns);
        let identities: Vec<String> = cells.keys().cloned().collect();
        for identity in identities {
            let change_cell = cells.get(&identity).cloned().unwrap_or_default();
            let base_cell = base.cells.get(&identity).cloned().unwrap_or_default();
            let content = change_cell.content.invert(&base_cell.content);
            let attributes = attributes::invert(
                change_cell.attributes.as_ref(),
                base_cell.attributes.as_ref(),
            );
            store_cell(&mut cells, identity, CellData::compact(content, Some(attributes)));
        }
        // cells removed together with their row or column come back
        for (identity, base_cell) in &base.cells {
            let Some((row, column)) = parse_cell_identity(identity) else {
                continue;
            };
            if compose_position(&self.rows, row).is_none()
                || compose_position(&self.columns, column).is_none()
            {
                cells.insert(identity.clone(), base_cell.clone());
            }
        }
        TableData {
            rows,
            columns,
            cells,
        }
    }
}

/// [`EmbedHandler`] for `"table-embed"` payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableHandler;

impl EmbedHandler for TableHandler {
    fn compose(&self, base: &Value, change: &Value, keep_null: bool) -> Value {
        let base: TableData = parse_payload(base, TABLE_EMBED);
        let change: TableData = parse_payload(change, TABLE_EMBED);
        to_payload(&base.compose(&change, keep_null), TABLE_EMBED)
    }

    fn transform(&self, ours: &Value, other: &Value, priority: bool) -> Value {
        let ours: TableData = parse_payload(ours, TABLE_EMBED);
        let other: TableData = parse_payload(other, TABLE_EMBED);
        to_payload(&ours.transform(&other, priority), TABLE_EMBED)
    }

    fn invert(&self, change: &Value, base: &Value) -> Value {
        let change: TableData = parse_payload(change, TABLE_EMBED);
        let base: TableData = parse_payload(base, TABLE_EMBED);
        to_payload(&change.invert(&base), TABLE_EMBED)
    }
}

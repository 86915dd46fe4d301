//! Shared helpers for benchmark tests

use serde_json::json;
use yquill::binding::{Binding, BindingOptions};
use yquill::delta::Delta;
use yquill::editor::MemoryEditor;
use yrs::{Doc, OffsetKind, Options};

/// A document with UTF-16 offsets and an editor bound to its "quill" text.
pub fn setup_binding() -> (Doc, Binding<MemoryEditor>) {
    let doc = Doc::with_options(Options {
        offset_kind: OffsetKind::Utf16,
        ..Options::default()
    });
    let text = doc.get_or_insert_text("quill");
    let binding = Binding::new(&doc, text, MemoryEditor::new(), None, BindingOptions::default())
        .expect("Failed to create binding");
    (doc, binding)
}

/// A document of `paragraphs` lines, every other one partly bold.
pub fn document_with_paragraphs(paragraphs: usize) -> Delta {
    let mut delta = Delta::new();
    for i in 0..paragraphs {
        delta.insert(format!("Paragraph {i} starts plain, "));
        let mut bold = serde_json::Map::new();
        if i % 2 == 0 {
            bold.insert("bold".to_string(), json!(true));
        }
        delta.insert_with(
            yquill::delta::InsertValue::Text("then maybe bold.".to_string()),
            Some(bold),
        );
        delta.insert("\n");
    }
    delta
}

/// A table payload with `size` rows, `size` columns and a filled diagonal.
pub fn table_with_size(size: usize) -> Delta {
    let rows: Vec<_> = (0..size).map(|i| json!({ "insert": { "id": format!("row{i}") } })).collect();
    let columns: Vec<_> = (0..size).map(|i| json!({ "insert": { "id": format!("col{i}") } })).collect();
    let cells: serde_json::Map<_, _> = (0..size)
        .map(|i| {
            (
                format!("{}:{}", i + 1, i + 1),
                json!({ "content": [{ "insert": format!("cell {i}") }] }),
            )
        })
        .collect();
    serde_json::from_value(json!([{ "insert": { "table-embed": {
        "rows": rows,
        "columns": columns,
        "cells": cells
    } } }]))
    .expect("Failed to build table")
}

//! Tables stored as shared types, observed through two editors.
//!
//! Most tests bind two editors to one document: the first makes the edit,
//! the second only sees what reached the document.

use serde_json::{Value, json};
use yrs::types::text::{Diff, YChange};
use yrs::{Map, Out, Text, Transact};

use crate::helpers::*;

fn initial_table() -> Value {
    json!([{ "insert": { "table-embed": {
        "rows": [
            { "insert": { "id": "11111111" }, "attributes": { "height": 20 } }
        ],
        "columns": [
            { "insert": { "id": "22222222" } },
            { "insert": { "id": "33333333" }, "attributes": { "width": 30 } },
            { "insert": { "id": "44444444" } }
        ],
        "cells": {
            "1:2": {
                "content": [{ "insert": "Hello" }],
                "attributes": { "align": "center" }
            }
        }
    } } }])
}

/// Two editors bound to the same document.
fn shared_pair() -> (TestPeer, TestPeer) {
    let editor = TestPeer::new();
    let observer = TestPeer::on_doc(editor.doc.clone());
    (editor, observer)
}

/// The table payload shown by a peer's editor.
fn table(peer: &TestPeer) -> Value {
    let contents = peer.contents();
    let embed = contents.ops[0].embed().expect("content starts with a table");
    assert_eq!(embed.name, "table-embed");
    embed.data.clone()
}

fn assert_same_everywhere(editor: &TestPeer, observer: &TestPeer) {
    assert_eq!(editor.contents(), observer.contents());
    observer.flush();
    // A late editor reads the stored table rather than a stream of changes.
    let late = TestPeer::on_doc(editor.doc.clone());
    assert_eq!(late.normalized(), editor.normalized());
}

/// Number of cell entries stored in the first table of a document.
fn stored_cell_count(peer: &TestPeer) -> u32 {
    let txn = peer.doc.transact();
    let text = peer.binding.text();
    let Some(Diff {
        insert: Out::YMap(element),
        ..
    }) = text.diff(&txn, YChange::identity).into_iter().next()
    else {
        panic!("document does not start with an embed element");
    };
    match element.get(&txn, "cells") {
        Some(Out::YMap(cells)) => cells.len(&txn),
        _ => 0,
    }
}

#[test]
fn test_basic() {
    let (editor, observer) = shared_pair();
    editor.apply(initial_table());

    assert_eq!(table(&editor)["cells"].as_object().unwrap().len(), 1);
    assert_eq!(table(&editor), initial_table()[0]["insert"]["table-embed"]);
    assert_same_everywhere(&editor, &observer);
}

#[test]
fn test_compose_add_a_row() {
    let (editor, observer) = shared_pair();
    editor.apply(initial_table());
    editor.apply(json!([{ "retain": { "table-embed": {
        "rows": [{ "insert": { "id": "55555555" } }]
    } } }]));

    assert_eq!(
        editor.normalized(),
        delta(json!([{ "insert": { "table-embed": {
            "rows": [
                { "insert": { "id": "55555555" } },
                { "insert": { "id": "11111111" }, "attributes": { "height": 20 } }
            ],
            "columns": [
                { "insert": { "id": "22222222" } },
                { "insert": { "id": "33333333" }, "attributes": { "width": 30 } },
                { "insert": { "id": "44444444" } }
            ],
            "cells": {
                "2:2": {
                    "content": [{ "insert": "Hello" }],
                    "attributes": { "align": "center" }
                }
            }
        } } }]))
    );
    assert_same_everywhere(&editor, &observer);
}

#[test]
fn test_adds_two_rows() {
    let (editor, observer) = shared_pair();
    editor.apply(initial_table());
    editor.apply(json!([{ "retain": { "table-embed": {
        "rows": [
            { "insert": { "id": "55555555" } },
            { "insert": { "id": "66666666" } }
        ]
    } } }]));

    let table = table(&observer);
    assert_eq!(table["rows"].as_array().unwrap().len(), 3);
    assert_eq!(table["rows"][2]["insert"]["id"], json!("11111111"));
    assert_eq!(
        table["cells"],
        json!({ "3:2": {
            "content": [{ "insert": "Hello" }],
            "attributes": { "align": "center" }
        } })
    );
    assert_same_everywhere(&editor, &observer);
}

#[test]
fn test_adds_a_row_and_changes_cell_content() {
    let (editor, observer) = shared_pair();
    editor.apply(json!([{ "insert": { "table-embed": {
        "rows": [
            { "insert": { "id": "11111111" } },
            { "insert": { "id": "22222222" }, "attributes": { "height": 20 } }
        ],
        "columns": [
            { "insert": { "id": "33333333" } },
            { "insert": { "id": "44444444" }, "attributes": { "width": 30 } },
            { "insert": { "id": "55555555" } }
        ],
        "cells": {
            "2:2": { "content": [{ "insert": "Hello" }] },
            "2:3": { "content": [{ "insert": "World" }] }
        }
    } } }]));
    editor.apply(json!([{ "retain": { "table-embed": {
        "rows": [{ "insert": { "id": "66666666" } }],
        "cells": {
            "3:2": { "attributes": { "align": "right" } },
            "3:3": { "content": [{ "insert": "Hello " }] }
        }
    } } }]));

    assert_eq!(
        table(&editor)["cells"],
        json!({
            "3:2": {
                "content": [{ "insert": "Hello" }],
                "attributes": { "align": "right" }
            },
            "3:3": { "content": [{ "insert": "Hello World" }] }
        })
    );
    assert_same_everywhere(&editor, &observer);
}

#[test]
fn test_deletes_a_column() {
    let (editor, observer) = shared_pair();
    editor.apply(initial_table());
    editor.apply(json!([{ "retain": { "table-embed": {
        "columns": [{ "retain": 1 }, { "delete": 1 }]
    } } }]));

    assert_eq!(
        table(&editor),
        json!({
            "rows": [
                { "insert": { "id": "11111111" }, "attributes": { "height": 20 } }
            ],
            "columns": [
                { "insert": { "id": "22222222" } },
                { "insert": { "id": "44444444" } }
            ]
        })
    );
    assert_same_everywhere(&editor, &observer);
    // The cell of the deleted column was collected by the late editor.
    assert_eq!(stored_cell_count(&editor), 0);
}

#[test]
fn test_move_column() {
    let (editor, observer) = shared_pair();
    editor.apply(json!([{ "insert": { "table-embed": {
        "rows": [{ "insert": { "id": "a" } }],
        "columns": [
            { "insert": { "id": "b" } },
            { "insert": { "id": "c" } },
            { "insert": { "id": "d" } }
        ],
        "cells": {
            "1:1": {
                "content": [{ "insert": "Hello" }],
                "attributes": { "align": "center" }
            }
        }
    } } }]));
    editor.apply(json!([{ "retain": { "table-embed": {
        "columns": [{ "delete": 1 }, { "retain": 1 }, { "insert": { "id": "b" } }]
    } } }]));

    // Deleting the column drops its cells in the editor, even though the
    // column comes back under the same identity.
    let expected = json!({
        "rows": [{ "insert": { "id": "a" } }],
        "columns": [
            { "insert": { "id": "c" } },
            { "insert": { "id": "b" } },
            { "insert": { "id": "d" } }
        ]
    });
    assert_eq!(table(&editor), expected);
    assert_eq!(table(&observer), expected);
    assert_eq!(editor.contents(), observer.contents());
}

#[test]
fn test_remove_a_cell_attribute() {
    let (editor, observer) = shared_pair();
    editor.apply(json!([{ "insert": { "table-embed": {
        "rows": [{ "insert": { "id": "111" } }],
        "columns": [{ "insert": { "id": "222" } }],
        "cells": { "1:1": { "attributes": { "align": "center" } } }
    } } }]));
    editor.apply(json!([{ "retain": { "table-embed": {
        "cells": { "1:1": { "attributes": { "align": null } } }
    } } }]));

    assert_eq!(
        table(&editor),
        json!({
            "rows": [{ "insert": { "id": "111" } }],
            "columns": [{ "insert": { "id": "222" } }]
        })
    );
    assert_same_everywhere(&editor, &observer);
}

#[test]
fn test_inserted_lines_get_identities() {
    let (editor, observer) = shared_pair();
    editor.apply(json!([{ "insert": { "table-embed": {
        "rows": [{ "insert": { "id": "r1" } }],
        "columns": [{ "insert": { "id": "c1" } }]
    } } }]));
    // A line inserted without an identity gets a fresh one in the document.
    editor.apply(json!([{ "retain": { "table-embed": {
        "rows": [{ "retain": 1 }, { "insert": { "id": null } }]
    } } }]));

    let rows = table(&observer)["rows"].clone();
    let id = rows[1]["insert"]["id"].as_str().expect("row has an identity");
    assert!(!id.is_empty());
    assert_ne!(id, "r1");
}

#[test]
fn test_concurrent_duplicate_rows_are_repaired() {
    let alice = TestPeer::new();
    let bob = TestPeer::new();
    alice.apply(json!([{ "insert": { "table-embed": {
        "rows": [{ "insert": { "id": "r1" } }],
        "columns": [{ "insert": { "id": "c1" } }]
    } } }]));
    sync_peers(&alice, &bob);

    // Both add a row with the same identity.
    let add_row = json!([{ "retain": { "table-embed": {
        "rows": [{ "retain": 1 }, { "insert": { "id": "dup" } }]
    } } }]);
    alice.apply(add_row.clone());
    bob.apply(add_row);
    sync_peers(&alice, &bob);
    sync_peers(&alice, &bob);

    for peer in [&alice, &bob] {
        let rows = table(peer)["rows"].clone();
        assert_eq!(
            rows,
            json!([{ "insert": { "id": "r1" } }, { "insert": { "id": "dup" } }])
        );
    }
    assert_converged(&[alice, bob]);
}

#[test]
fn test_orphaned_cells_are_collected() {
    let alice = TestPeer::new();
    let bob = TestPeer::new();
    alice.apply(json!([{ "insert": { "table-embed": {
        "rows": [{ "insert": { "id": "r1" } }, { "insert": { "id": "r2" } }],
        "columns": [{ "insert": { "id": "c1" } }]
    } } }]));
    sync_peers(&alice, &bob);

    // Alice deletes the first row while Bob writes into it.
    alice.apply(json!([{ "retain": { "table-embed": {
        "rows": [{ "delete": 1 }]
    } } }]));
    bob.apply(json!([{ "retain": { "table-embed": {
        "cells": { "1:1": { "content": [{ "insert": "lost" }] } }
    } } }]));
    sync_peers(&alice, &bob);
    sync_peers(&alice, &bob);

    for peer in [&alice, &bob] {
        assert_eq!(
            table(peer),
            json!({
                "rows": [{ "insert": { "id": "r2" } }],
                "columns": [{ "insert": { "id": "c1" } }]
            })
        );
        assert_eq!(stored_cell_count(peer), 0);
    }
}

#[test]
fn test_table_after_text() {
    let (editor, observer) = shared_pair();
    editor.apply(json!([{ "insert": "Intro\n" }]));
    editor.apply(json!([
        { "retain": 6 },
        { "insert": { "table-embed": {
            "rows": [{ "insert": { "id": "r1" } }],
            "columns": [{ "insert": { "id": "c1" } }]
        } } }
    ]));
    editor.apply(json!([
        { "retain": 6 },
        { "retain": { "table-embed": {
            "cells": { "1:1": { "content": [{ "insert": "cell" }] } }
        } } }
    ]));

    let contents = observer.contents();
    let embed = contents.ops[1].embed().expect("table follows the intro");
    assert_eq!(embed.data["cells"]["1:1"]["content"], json!([{ "insert": "cell" }]));
    assert_eq!(editor.contents(), observer.contents());
    // The plain text around the table is untouched.
    let txn = editor.doc.transact();
    let stored: Vec<Out> = editor
        .binding
        .text()
        .diff(&txn, YChange::identity)
        .into_iter()
        .map(|diff| diff.insert)
        .collect();
    assert_eq!(stored.len(), 2);
}

/// A one-cell table shared by every peer.
fn shared_one_cell_table(peers: &[TestPeer]) {
    peers[0].apply(json!([{ "insert": { "table-embed": {
        "rows": [{ "insert": { "id": "r1" } }],
        "columns": [{ "insert": { "id": "c1" } }]
    } } }]));
    sync_all(peers);
}

fn write_cell(peer: &TestPeer, key: &str, text: &str) {
    peer.apply(json!([{ "retain": { "table-embed": {
        "cells": { key: { "content": [{ "insert": text }] } }
    } } }]));
}

#[test]
fn test_concurrent_first_writes_to_a_cell_converge() {
    let peers = [TestPeer::new(), TestPeer::new()];
    shared_one_cell_table(&peers);

    write_cell(&peers[0], "1:1", "A");
    write_cell(&peers[1], "1:1", "B");
    sync_peers(&peers[0], &peers[1]);
    sync_peers(&peers[0], &peers[1]);

    assert_converged(&peers);
    let content = table(&peers[0])["cells"]["1:1"]["content"].clone();
    assert!(
        content == json!([{ "insert": "A" }]) || content == json!([{ "insert": "B" }]),
        "one write wins whole, got {content}"
    );
    let late = TestPeer::on_doc(peers[1].doc.clone());
    assert_eq!(late.normalized(), peers[0].normalized());
    assert_eq!(stored_cell_count(&peers[0]), 1);
}

#[test]
fn test_three_concurrent_first_writes_converge() {
    let peers = [TestPeer::new(), TestPeer::new(), TestPeer::new()];
    shared_one_cell_table(&peers);

    for peer in &peers {
        write_cell(peer, "1:1", "z");
    }
    sync_all(&peers);

    assert_converged(&peers);
    assert_eq!(
        table(&peers[2])["cells"]["1:1"]["content"],
        json!([{ "insert": "z" }])
    );
}

#[test]
fn test_duplicate_row_keeps_its_cells() {
    let alice = TestPeer::new();
    let bob = TestPeer::new();
    shared_one_cell_table(std::slice::from_ref(&alice));
    sync_peers(&alice, &bob);

    let add_row = json!([{ "retain": { "table-embed": {
        "rows": [{ "retain": 1 }, { "insert": { "id": "dup" } }]
    } } }]);
    alice.apply(add_row.clone());
    bob.apply(add_row);
    write_cell(&alice, "2:1", "b");
    sync_peers(&alice, &bob);
    sync_peers(&alice, &bob);

    let expected = json!({
        "rows": [{ "insert": { "id": "r1" } }, { "insert": { "id": "dup" } }],
        "columns": [{ "insert": { "id": "c1" } }],
        "cells": { "2:1": { "content": [{ "insert": "b" }] } }
    });
    for peer in [&alice, &bob] {
        assert_eq!(table(peer), expected);
    }
    let late = TestPeer::on_doc(bob.doc.clone());
    assert_eq!(table(&late), expected);
}

#[test]
fn test_duplicate_row_with_cells_on_three_peers() {
    let peers = [TestPeer::new(), TestPeer::new(), TestPeer::new()];
    shared_one_cell_table(&peers);

    for peer in &peers {
        peer.apply(json!([{ "retain": { "table-embed": {
            "rows": [{ "insert": { "id": "top" } }]
        } } }]));
        write_cell(peer, "1:1", "z");
    }
    sync_all(&peers);

    assert_converged(&peers);
    let table = table(&peers[0]);
    assert_eq!(
        table["rows"],
        json!([{ "insert": { "id": "top" } }, { "insert": { "id": "r1" } }])
    );
    assert_eq!(table["cells"]["1:1"]["content"], json!([{ "insert": "z" }]));
}

#[test]
fn test_unregistered_embed_keeps_its_place() {
    let alice = TestPeer::new();
    alice.apply(json!([{ "insert": { "table-embed": initial_table() } }]));
    let options = yquill::binding::BindingOptions::new()
        .with_embeds(yquill::embed::EmbedRegistry::new());
    let bob = TestPeer::with_options(alice.doc.clone(), options);

    let contents = bob.contents();
    let embed = contents.ops[0].embed().expect("element still shows as an embed");
    assert_eq!(embed.name, "table-embed");
    assert!(embed.data.is_object());
    assert!(embed.data.get("$name").is_none());

    alice.apply(json!([{ "retain": 1 }, { "insert": "after" }]));
    assert_eq!(bob.contents().ops[1], yquill::delta::Op::insert_text("after\n"));
    assert_eq!(bob.length(), alice.length());
}

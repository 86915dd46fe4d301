//! Nested rich-text embeds.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use yquill::delta::{Delta, Op, utf16_len};
use yrs::types::text::{Diff, YChange};
use yrs::{Out, Text, Transact};

use crate::helpers::*;

#[test]
fn test_update_nested_content() {
    let editor = TestPeer::new();
    let observer = TestPeer::on_doc(editor.doc.clone());

    editor.apply(json!([{ "insert": { "delta": [{ "insert": "some content" }] } }]));
    assert_eq!(editor.contents(), observer.contents());

    editor.apply(json!([{ "retain": { "delta": [{ "retain": 4 }, { "delete": 8 }] } }]));
    let expected = delta(json!([
        { "insert": { "delta": [{ "insert": "some" }] } },
        { "insert": "\n" }
    ]));
    assert_eq!(editor.contents(), expected);
    assert_eq!(observer.contents(), expected);
}

#[test]
fn test_embed_is_stored_as_shared_type() {
    let peer = TestPeer::new();
    peer.apply(json!([
        { "insert": "before" },
        { "insert": { "delta": [{ "insert": "nested", "attributes": { "bold": true } }] } }
    ]));

    let txn = peer.doc.transact();
    let items: Vec<Out> = peer
        .binding
        .text()
        .diff(&txn, YChange::identity)
        .into_iter()
        .map(|Diff { insert, .. }| insert)
        .collect();
    assert_eq!(items.len(), 2);
    assert!(matches!(items[1], Out::YMap(_)));
}

#[test]
fn test_remote_peer_sees_nested_formatting() {
    let alice = TestPeer::new();
    let bob = TestPeer::new();
    alice.apply(json!([{ "insert": { "delta": [{ "insert": "abc" }] } }]));
    sync_peers(&alice, &bob);

    bob.apply(json!([{ "retain": { "delta": [
        { "retain": 1 },
        { "retain": 1, "attributes": { "italic": true } }
    ] } }]));
    sync_peers(&alice, &bob);

    let expected = json!([
        { "insert": "a" },
        { "insert": "b", "attributes": { "italic": true } },
        { "insert": "c" }
    ]);
    for peer in [&alice, &bob] {
        let contents = peer.contents();
        assert_eq!(contents.ops[0].embed().unwrap().data, expected);
    }
}

const MARKS: [Option<&str>; 4] = [
    None,
    Some(r#"{ "bold": true }"#),
    Some(r#"{ "italic": true }"#),
    Some(r##"{ "italic": true, "color": "#888" }"##),
];

fn marks(rng: &mut StdRng) -> Option<Value> {
    MARKS
        .choose(rng)
        .copied()
        .flatten()
        .map(|raw| serde_json::from_str(raw).unwrap())
}

fn insert_op(text: String, attributes: Option<Value>) -> Value {
    match attributes {
        Some(attributes) => json!({ "insert": text, "attributes": attributes }),
        None => json!({ "insert": text }),
    }
}

/// Positions and lengths of every rich-text embed in an editor.
fn nested_embeds(contents: &Delta) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut index = 0;
    for op in &contents.ops {
        if let Some(embed) = op.embed().filter(|embed| embed.name == "delta") {
            let nested: Delta = serde_json::from_value(embed.data.clone()).unwrap();
            found.push((index, nested.length()));
        }
        index += op.len();
    }
    found
}

fn random_edit(rng: &mut StdRng, peer: &TestPeer, counter: &mut usize) {
    // The editor's own trailing newline stays out of reach.
    let content_len = peer.length() - 1;
    *counter += 1;
    match rng.gen_range(0..4) {
        0 => {
            let position = rng.gen_range(0..=content_len);
            let text = format!("{counter}{}", ["x", "yz"].choose(rng).unwrap());
            peer.apply(json!([{ "retain": position }, insert_op(text, marks(rng))]));
        }
        1 => {
            let position = rng.gen_range(0..=content_len);
            peer.apply(json!([
                { "retain": position },
                { "insert": { "delta": [{ "insert": "some content" }] } }
            ]));
        }
        2 => {
            let embeds = nested_embeds(&peer.contents());
            let Some(&(index, len)) = embeds.choose(rng) else {
                return;
            };
            let position = rng.gen_range(0..=len);
            let change = if rng.gen_bool(0.5) {
                json!([{ "retain": position }, insert_op(format!("{counter}w"), marks(rng))])
            } else {
                let count = rng.gen_range(0..=len - position).min(2);
                json!([{ "retain": position }, { "delete": count }])
            };
            peer.apply(json!([{ "retain": index }, { "retain": { "delta": change } }]));
        }
        _ => {
            let position = rng.gen_range(0..=content_len);
            let count = rng.gen_range(0..=content_len - position).min(2);
            peer.apply(json!([{ "retain": position }, { "delete": count }]));
        }
    }
}

#[test]
fn test_random_nested_edits_converge() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let peers: Vec<TestPeer> = (0..3).map(|_| TestPeer::new()).collect();
        let mut counter = 0;
        for _ in 0..30 {
            let peer = &peers[rng.gen_range(0..peers.len())];
            random_edit(&mut rng, peer, &mut counter);
            if rng.gen_bool(0.5) {
                let a = rng.gen_range(0..peers.len());
                let b = rng.gen_range(0..peers.len());
                if a != b {
                    send_update(&peers[a], &peers[b]);
                }
            }
        }
        sync_all(&peers);
        assert_converged(&peers);

        // Nested content is never flattened into the text.
        let txn = peers[0].doc.transact();
        for Diff { insert, .. } in peers[0].binding.text().diff(&txn, YChange::identity) {
            if let Out::Any(any) = insert {
                let value = yquill::convert::any_to_json(&any);
                assert!(value.get("delta").is_none(), "seed {seed}: flattened embed {value}");
            }
        }
    }
}

#[test]
fn test_nested_lengths_use_utf16() {
    let peer = TestPeer::new();
    peer.apply(json!([{ "insert": { "delta": [{ "insert": "😀a" }] } }]));
    peer.apply(json!([{ "retain": { "delta": [{ "retain": 2 }, { "insert": "b" }] } }]));

    let contents = peer.contents();
    let nested: Delta = serde_json::from_value(contents.ops[0].embed().unwrap().data.clone()).unwrap();
    assert_eq!(nested.text(), "😀ba");
    assert_eq!(utf16_len(&nested.text()), 4);
    assert!(matches!(contents.ops[1], Op::Insert { .. }));
}

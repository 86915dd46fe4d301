//! The delta algebra as a host uses it.

use serde_json::{Value, json};
use yquill::delta::{Delta, Embed, EmbedHandler, EmbedHandlers, InsertValue, normalize};

use crate::helpers::delta;

/// Embed whose payload is a number that changes add up.
struct Counter;

impl EmbedHandler for Counter {
    fn compose(&self, base: &Value, change: &Value, _keep_null: bool) -> Value {
        json!(base.as_i64().unwrap_or(0) + change.as_i64().unwrap_or(0))
    }

    fn transform(&self, _ours: &Value, other: &Value, _priority: bool) -> Value {
        other.clone()
    }

    fn invert(&self, change: &Value, _base: &Value) -> Value {
        json!(-change.as_i64().unwrap_or(0))
    }
}

#[test]
fn test_diff_then_compose_reaches_target() {
    let before = delta(json!([
        { "insert": "Hello " },
        { "insert": "world", "attributes": { "bold": true } },
        { "insert": { "image": "a.png" } },
        { "insert": "\n" }
    ]));
    let after = delta(json!([
        { "insert": "Hello " },
        { "insert": "there", "attributes": { "italic": true } },
        { "insert": { "image": "b.png" } },
        { "insert": "\n" }
    ]));

    let change = before.diff(&after).unwrap();
    assert_eq!(before.compose(&change), after);
    assert!(after.diff(&after).unwrap().is_empty());
}

#[test]
fn test_concurrent_inserts_converge() {
    let base = delta(json!([{ "insert": "abc" }]));
    let alice = delta(json!([{ "retain": 1 }, { "insert": "X" }]));
    let bob = delta(json!([{ "retain": 1 }, { "insert": "Y" }, { "retain": 1 }, { "delete": 1 }]));

    let left = base.compose(&alice).compose(&alice.transform(&bob, true));
    let right = base.compose(&bob).compose(&bob.transform(&alice, false));
    assert_eq!(left, right);
    assert_eq!(left.text(), "aXYb");
}

#[test]
fn test_invert_undoes_formatting_and_deletes() {
    let base = delta(json!([
        { "insert": "plain " },
        { "insert": "bold", "attributes": { "bold": true } }
    ]));
    let change = delta(json!([
        { "retain": 2, "attributes": { "italic": true } },
        { "delete": 6 }
    ]));

    let undo = change.invert(&base);
    assert_eq!(base.compose(&change).compose(&undo), base);
}

#[test]
fn test_custom_embed_handler() {
    let handlers = EmbedHandlers::new().with_handler("counter", Counter);
    let base = delta(json!([{ "insert": { "counter": 1 } }]));
    let change = delta(json!([{ "retain": { "counter": 2 } }]));

    let composed = base.compose_with(&change, &handlers);
    let expected = Embed::new("counter", json!(3));
    assert_eq!(
        composed.ops[0].insert_value(),
        Some(&InsertValue::Embed(expected))
    );

    let undo = change.invert_with(&base, &handlers);
    assert_eq!(composed.compose_with(&undo, &handlers), base);
}

#[test]
fn test_normalize_ignores_editor_newline() {
    let editor = delta(json!([{ "insert": "text\n" }]));
    let document = delta(json!([{ "insert": "text" }]));
    assert_eq!(normalize(&editor), normalize(&document));
    assert_eq!(Delta::new().diff(&Delta::new()).unwrap(), Delta::new());
}

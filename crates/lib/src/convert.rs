//! Conversions between yrs values and editor deltas.

use std::sync::Arc;

use serde_json::{Number, Value};
use tracing::warn;
use yrs::types::Delta as YDelta;
use yrs::types::text::{Diff, YChange};
use yrs::types::{Attrs, EntryChange};
use yrs::{Any, Out, ReadTxn, Text, TextRef, TransactionMut};

use crate::delta::{AttributeMap, Delta, Embed, InsertValue, Op, RetainValue, utf16_len};

/// Largest integer a float carries exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(value) => Value::Bool(*value),
        Any::Number(value) => number_to_json(*value),
        Any::BigInt(value) => Value::from(*value),
        Any::String(value) => Value::String(value.to_string()),
        Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), any_to_json(value)))
                .collect(),
        ),
    }
}

// Integral floats come back as integers so `20` and `20.0` compare equal.
fn number_to_json(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        Value::from(value as i64)
    } else {
        Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub fn json_to_any(value: &Value) -> Any {
    match value {
        Value::Null => Any::Null,
        Value::Bool(value) => Any::Bool(*value),
        Value::Number(number) => Any::Number(number.as_f64().unwrap_or_default()),
        Value::String(value) => Any::String(Arc::from(value.as_str())),
        Value::Array(items) => Any::Array(Arc::from(
            items.iter().map(json_to_any).collect::<Vec<_>>(),
        )),
        Value::Object(map) => Any::Map(Arc::new(
            map.iter()
                .map(|(key, value)| (key.clone(), json_to_any(value)))
                .collect(),
        )),
    }
}

pub fn attrs_to_map(attrs: &Attrs) -> AttributeMap {
    attrs
        .iter()
        .map(|(key, value)| (key.to_string(), any_to_json(value)))
        .collect()
}

/// Attributes for formatting; nulls become removals.
pub fn map_to_attrs(map: &AttributeMap) -> Attrs {
    map.iter()
        .map(|(key, value)| (Arc::from(key.as_str()), json_to_any(value)))
        .collect()
}

/// Attributes for inserted content, where a null simply means absent.
pub(crate) fn insert_attrs(map: Option<&AttributeMap>) -> Attrs {
    map.into_iter()
        .flatten()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (Arc::from(key.as_str()), json_to_any(value)))
        .collect()
}

pub(crate) fn optional_attrs(attrs: Option<&Attrs>) -> Option<AttributeMap> {
    attrs.map(attrs_to_map).filter(|map| !map.is_empty())
}

/// Interpret a primitive value stored in a text: a string chunk or a
/// single-key embed object.
pub fn any_to_insert(any: &Any) -> Option<InsertValue> {
    match any {
        Any::String(text) => Some(InsertValue::Text(text.to_string())),
        other => match any_to_json(other) {
            Value::Object(map) => Embed::from_map(&map).map(InsertValue::Embed),
            _ => None,
        },
    }
}

/// The JSON stored for an embed that is kept as a primitive value.
pub fn embed_to_any(embed: &Embed) -> Any {
    json_to_any(&embed.to_value())
}

/// Full content of a text holding only strings and primitive embeds.
pub fn text_content<T: ReadTxn>(txn: &T, text: &TextRef) -> Delta {
    let mut delta = Delta::new();
    for Diff {
        insert, attributes, ..
    } in text.diff(txn, YChange::identity)
    {
        match &insert {
            Out::Any(any) => match any_to_insert(any) {
                Some(value) => {
                    delta.insert_with(value, optional_attrs(attributes.as_deref()));
                }
                None => warn!(value = %any, "skipping content that is neither text nor an embed"),
            },
            _ => warn!("skipping a shared type nested in plain text"),
        }
    }
    delta
}

/// Editor delta for a text event whose inserts are strings or primitive embeds.
pub fn event_delta(changes: &[YDelta]) -> Delta {
    event_delta_with(changes, |_| None)
}

/// Editor delta for a text event. `shared` converts inserted shared types.
pub fn event_delta_with<F>(changes: &[YDelta], mut shared: F) -> Delta
where
    F: FnMut(&Out) -> Option<InsertValue>,
{
    let mut delta = Delta::new();
    for change in changes {
        match change {
            YDelta::Inserted(value, attributes) => {
                let attributes = optional_attrs(attributes.as_deref());
                let value = match value {
                    Out::Any(any) => any_to_insert(any),
                    other => shared(other),
                };
                match value {
                    Some(value) => {
                        delta.insert_with(value, attributes);
                    }
                    None => warn!("skipping inserted content with no editor representation"),
                }
            }
            YDelta::Deleted(count) => {
                delta.delete(*count as usize);
            }
            YDelta::Retain(count, attributes) => {
                delta.retain_with(
                    RetainValue::Count(*count as usize),
                    optional_attrs(attributes.as_deref()),
                );
            }
        }
    }
    delta
}

/// Apply a delta to a text. Embeds are stored as primitive values.
///
/// Retains and deletes past the end of the text are clamped and logged.
pub fn apply_delta(txn: &mut TransactionMut, text: &TextRef, delta: &Delta) {
    let mut index: u32 = 0;
    let mut len = text.len(&*txn);
    for op in &delta.ops {
        match op {
            Op::Insert { value, attributes } => {
                let attrs = insert_attrs(attributes.as_ref());
                match value {
                    InsertValue::Text(chunk) => {
                        text.insert_with_attributes(txn, index, chunk, attrs);
                        let added = utf16_len(chunk) as u32;
                        index += added;
                        len += added;
                    }
                    InsertValue::Embed(embed) => {
                        text.insert_embed_with_attributes(txn, index, embed_to_any(embed), attrs);
                        index += 1;
                        len += 1;
                    }
                }
            }
            Op::Retain { value, attributes } => {
                let count = clamp(op.len(), index, len, "retain");
                if let Some(attributes) = attributes {
                    if count > 0 {
                        text.format(txn, index, count, map_to_attrs(attributes));
                    }
                }
                if let RetainValue::Embed(embed) = value {
                    warn!(embed = %embed.name, "embed patch reached a plain text, retaining it");
                }
                index += count;
            }
            Op::Delete(count) => {
                let count = clamp(*count, index, len, "delete");
                if count > 0 {
                    text.remove_range(txn, index, count);
                    len -= count;
                }
            }
        }
    }
}

fn clamp(requested: usize, index: u32, len: u32, kind: &str) -> u32 {
    let available = len.saturating_sub(index);
    let requested = u32::try_from(requested).unwrap_or(u32::MAX);
    if requested > available {
        warn!(kind, requested, available, "delta runs past the end of the text");
        available
    } else {
        requested
    }
}

/// New value of a map entry after a change, or `None` when it was removed.
pub fn entry_change_value(change: &EntryChange) -> Option<&Out> {
    match change {
        EntryChange::Inserted(value) | EntryChange::Updated(_, value) => Some(value),
        EntryChange::Removed(_) => None,
    }
}

/// JSON for a map value; shared types have no JSON form here.
pub fn out_to_json(value: &Out) -> Value {
    match value {
        Out::Any(any) => any_to_json(any),
        _ => Value::Null,
    }
}

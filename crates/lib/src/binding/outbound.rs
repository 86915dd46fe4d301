//! Editor changes flowing into the document.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use yrs::types::text::{Diff, YChange};
use yrs::{Any, Map, MapPrelim, MapRef, Out, ReadTxn, Text, TextRef, TransactionMut};

use super::{Context, Inner};
use crate::convert;
use crate::delta::{Delta, InsertValue, Op, RetainValue, utf16_len};
use crate::editor::Editor;
use crate::embed::{EMBED_NAME_KEY, EmbedRegistry, element_name, item_len};

impl<E: Editor> Inner<E> {
    /// Remember every attribute the editor uses.
    pub(super) fn record_formats(&mut self, change: &Delta) {
        for attributes in change.ops.iter().filter_map(Op::attributes) {
            for key in attributes.keys() {
                if !self.negated_formats.contains_key(key) {
                    self.negated_formats.insert(key.clone(), Value::Bool(false));
                }
            }
        }
    }

    /// Write an editor change into the bound text.
    pub(super) fn write_change(&mut self, txn: &mut TransactionMut, ctx: &Context, change: &Delta) {
        let (plain, routed) = split_change(change, &self.embeds);
        convert::apply_delta(txn, &ctx.text, &plain);

        // `routed` addresses the text after the plain part was applied.
        let mut index = 0u32;
        for op in &routed.ops {
            match op {
                Op::Retain {
                    value: RetainValue::Count(count),
                    ..
                } => index += *count as u32,
                Op::Insert {
                    value: InsertValue::Embed(embed),
                    attributes,
                } => {
                    if let Some(definition) = self.embeds.get(&embed.name) {
                        let element: MapRef = ctx.text.insert_embed_with_attributes(
                            txn,
                            index,
                            MapPrelim::default(),
                            convert::insert_attrs(attributes.as_ref()),
                        );
                        element.insert(txn, EMBED_NAME_KEY, Any::String(Arc::from(embed.name.as_str())));
                        if let Err(err) =
                            definition.update(txn, &element, &embed.data, &mut self.pending.repairs)
                        {
                            warn!(embed = %embed.name, %err, "embed insert partly dropped");
                        }
                    }
                    index += 1;
                }
                Op::Retain {
                    value: RetainValue::Embed(embed),
                    ..
                } => {
                    let element = embed_element_at(&*txn, &ctx.text, index)
                        .filter(|element| element_name(&*txn, element).as_deref() == Some(embed.name.as_str()));
                    match (element, self.embeds.get(&embed.name)) {
                        (Some(element), Some(definition)) => {
                            if let Err(err) =
                                definition.update(txn, &element, &embed.data, &mut self.pending.repairs)
                            {
                                warn!(embed = %embed.name, %err, "embed change partly dropped");
                            }
                        }
                        _ => warn!(embed = %embed.name, index, "expected embed not found"),
                    }
                    index += 1;
                }
                Op::Insert {
                    value: InsertValue::Text(text),
                    ..
                } => index += utf16_len(text) as u32,
                Op::Delete(_) => {}
            }
        }
    }
}

/// Split a change into the part the text applies directly and the part
/// routed to embed definitions.
///
/// Registered embeds go to the routed part and are skipped over in the plain
/// part; everything else is plain and skipped over in the routed part.
pub(super) fn split_change(change: &Delta, embeds: &EmbedRegistry) -> (Delta, Delta) {
    let mut plain = Delta::new();
    let mut routed = Delta::new();
    for op in &change.ops {
        match op.embed() {
            Some(embed) if embeds.contains(&embed.name) => {
                if let Op::Retain { attributes, .. } = op {
                    plain.retain_with(RetainValue::Count(1), attributes.clone());
                }
                routed.push(op.clone());
            }
            Some(_) => {
                routed.retain(1);
                plain.push(op.clone());
            }
            None => {
                if !op.is_delete() {
                    routed.retain(op.len());
                }
                plain.push(op.clone());
            }
        }
    }
    (plain, routed)
}

/// The embed element at `index`, if there is one.
fn embed_element_at<T: ReadTxn>(txn: &T, text: &TextRef, index: u32) -> Option<MapRef> {
    let mut offset = 0u32;
    for Diff { insert, .. } in text.diff(txn, YChange::identity) {
        if offset == index {
            return match insert {
                Out::YMap(element) => Some(element),
                _ => None,
            };
        }
        let len = item_len(&insert);
        if offset + len > index {
            return None;
        }
        offset += len;
    }
    None
}

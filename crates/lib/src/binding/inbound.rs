//! Document changes flowing into the editor.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};
use yrs::types::Delta as YDelta;
use yrs::types::text::{Diff, YChange};
use yrs::types::{Event, Events, PathSegment, ToJson};
use yrs::{MapRef, Out, ReadTxn, Text, TextRef, TransactionMut};

use super::{Context, Inner};
use crate::convert;
use crate::delta::{AttributeMap, Delta, Embed, InsertValue, Op, RetainValue, normalize};
use crate::editor::{ChangeSource, Editor};
use crate::embed::{EMBED_NAME_KEY, EmbedRegistry, Repairs, ScopedEvent, element_name, item_len};

impl<E: Editor> Inner<E> {
    /// Replace the editor's content with the document's.
    pub(super) fn load_document(&mut self, txn: &TransactionMut, ctx: &Context) {
        let contents = self.document_content(txn, &ctx.text);
        let applied = self
            .editor
            .set_contents(&contents, &ChangeSource::Binding(ctx.token.clone()));
        self.record_formats(&applied);
    }

    /// Forward a batch of document events to the editor.
    pub(super) fn apply_document_events(&mut self, txn: &TransactionMut, events: &Events, ctx: &Context) {
        let mut root = None;
        let mut nested: BTreeMap<u32, Vec<ScopedEvent<'_>>> = BTreeMap::new();
        for event in events.iter() {
            let mut path = event.path();
            match path.pop_front() {
                None => match event {
                    Event::Text(event) => root = Some(event),
                    _ => warn!("unexpected event type on the bound text"),
                },
                Some(PathSegment::Index(index)) => nested.entry(index).or_default().push(ScopedEvent {
                    path: path.into_iter().collect(),
                    event,
                }),
                Some(PathSegment::Key(key)) => {
                    warn!(key = %key, "unexpected keyed path below the bound text")
                }
            }
        }

        let embed_changes = self.embed_changes(txn, ctx, &nested);
        let change = match root {
            Some(event) => {
                let change = self.sanitize(txn, event.delta(txn));
                if embed_changes.is_empty() {
                    change
                } else {
                    change.compose(&embed_changes)
                }
            }
            None => embed_changes,
        };

        let applied = (!change.is_empty()).then(|| {
            let applied = self
                .editor
                .update_contents(&change, &ChangeSource::Binding(ctx.token.clone()));
            self.record_formats(&applied);
            applied
        });
        // Before the fold-back check, which would otherwise push a drifted
        // embed into the document.
        self.resync_embeds(txn, ctx, nested.keys().copied());
        if applied.is_some_and(|applied| !ops_equivalent(&applied, &change)) {
            self.detect_implicit_change(txn, ctx);
        }
        self.render_all_cursors(txn, ctx);
    }

    /// Bring the editor's copy of each changed embed in line with the
    /// document where the patches sent so far fell short.
    fn resync_embeds<I>(&mut self, txn: &TransactionMut, ctx: &Context, indexes: I)
    where
        I: IntoIterator<Item = u32>,
    {
        let mut indexes = indexes.into_iter().peekable();
        if indexes.peek().is_none() {
            return;
        }
        let elements = embed_elements(txn, &ctx.text);
        let contents = self.editor.contents();
        let mut correction = Delta::new();
        let mut offset = 0usize;
        for index in indexes {
            let Some(element) = elements.get(&index) else {
                continue;
            };
            let Some(name) = element_name(txn, element) else {
                continue;
            };
            let Some(definition) = self.embeds.get(&name) else {
                continue;
            };
            let index = index as usize;
            let Some((current, attributes)) = editor_embed_at(&contents, index, &name) else {
                warn!(embed = %name, index, "editor has no matching embed to resync");
                continue;
            };
            // Repairs found here were already queued by the patch itself.
            let target = definition.type_to_delta(txn, element, &mut Repairs::new());
            if current.data == target {
                continue;
            }
            let patch = definition.diff(&current.data, &target);
            if patch.as_ref().is_some_and(is_empty_patch) {
                continue;
            }
            debug!(embed = %name, index, "editor embed drifted from the document");
            correction.retain(index - offset);
            match patch {
                Some(patch) => {
                    correction.retain_embed(Embed::new(name, patch));
                }
                None => {
                    correction
                        .insert_with(InsertValue::Embed(Embed::new(name, target)), attributes)
                        .delete(1);
                }
            }
            offset = index + 1;
        }

        if !correction.is_empty() {
            let applied = self
                .editor
                .update_contents(&correction, &ChangeSource::Binding(ctx.token.clone()));
            self.record_formats(&applied);
        }
    }

    /// Embed retains for every embed element with changes inside it.
    fn embed_changes(
        &mut self,
        txn: &TransactionMut,
        ctx: &Context,
        nested: &BTreeMap<u32, Vec<ScopedEvent<'_>>>,
    ) -> Delta {
        let mut delta = Delta::new();
        if nested.is_empty() {
            return delta;
        }
        let elements = embed_elements(txn, &ctx.text);
        let mut offset = 0usize;
        for (&index, events) in nested {
            let Some(element) = elements.get(&index) else {
                warn!(index, "changed embed is not in the text");
                continue;
            };
            let Some(name) = element_name(txn, element) else {
                warn!(index, "changed embed has no name");
                continue;
            };
            let Some(definition) = self.embeds.get(&name) else {
                warn!(embed = %name, "no definition for changed embed");
                continue;
            };
            let patch = definition.events_to_delta(txn, element, events, &mut self.pending.repairs);
            let index = index as usize;
            delta.retain(index - offset);
            delta.retain_embed(Embed::new(name, patch));
            offset = index + 1;
        }
        delta
    }

    /// Editor delta for a change of the bound text itself. Inserted embed
    /// elements become their full content, and every insert explicitly
    /// unsets the formats the editor knows about unless it sets them.
    fn sanitize(&mut self, txn: &TransactionMut, changes: &[YDelta]) -> Delta {
        let embeds = &self.embeds;
        let repairs = &mut self.pending.repairs;
        let change = convert::event_delta_with(changes, |value| match value {
            Out::YMap(element) => embed_snapshot(txn, element, embeds, repairs).map(InsertValue::Embed),
            _ => None,
        });
        change
            .ops
            .into_iter()
            .map(|op| match op {
                Op::Insert { value, attributes } => {
                    let mut merged = self.negated_formats.clone();
                    merged.extend(attributes.unwrap_or_default());
                    Op::Insert {
                        value,
                        attributes: Some(merged).filter(|merged| !merged.is_empty()),
                    }
                }
                other => other,
            })
            .collect()
    }

    /// The bound text as an editor document.
    pub(super) fn document_content(&mut self, txn: &TransactionMut, text: &TextRef) -> Delta {
        let mut delta = Delta::new();
        for Diff {
            insert, attributes, ..
        } in text.diff(txn, YChange::identity)
        {
            let value = match &insert {
                Out::Any(any) => convert::any_to_insert(any),
                Out::YMap(element) => {
                    embed_snapshot(txn, element, &self.embeds, &mut self.pending.repairs)
                        .map(InsertValue::Embed)
                }
                _ => None,
            };
            match value {
                Some(value) => {
                    delta.insert_with(value, convert::optional_attrs(attributes.as_deref()));
                }
                None => warn!("skipping content with no editor representation"),
            }
        }
        delta
    }

    /// The editor did something other than what it was asked to. Queue the
    /// difference so the document catches up.
    fn detect_implicit_change(&mut self, txn: &TransactionMut, ctx: &Context) {
        let document = normalize(&self.document_content(txn, &ctx.text));
        let editor = normalize(&self.editor.contents());
        match document.diff(&editor) {
            Ok(change) if is_material(&change, ctx.text.len(txn) as usize) => {
                debug!(ops = change.ops.len(), "editor diverged from requested change");
                self.pending.fold_back.push(change);
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "failed to diff editor against document"),
        }
    }
}

/// The editor payload of an embed element.
fn embed_snapshot(
    txn: &TransactionMut,
    element: &MapRef,
    embeds: &EmbedRegistry,
    repairs: &mut Repairs,
) -> Option<Embed> {
    let Some(name) = element_name(txn, element) else {
        warn!("embedded map has no name");
        return None;
    };
    match embeds.get(&name) {
        Some(definition) => {
            let payload = definition.type_to_delta(txn, element, repairs);
            Some(Embed::new(name, payload))
        }
        None => {
            // Keeps its place in the editor so later offsets still line up.
            warn!(embed = %name, "no definition for embed, passing its content through");
            let mut content = convert::any_to_json(&element.to_json(txn));
            if let Value::Object(fields) = &mut content {
                fields.remove(EMBED_NAME_KEY);
            }
            Some(Embed::new(name, content))
        }
    }
}

/// Embed elements of `text` by offset.
fn embed_elements<T: ReadTxn>(txn: &T, text: &TextRef) -> BTreeMap<u32, MapRef> {
    let mut elements = BTreeMap::new();
    let mut offset = 0u32;
    for Diff { insert, .. } in text.diff(txn, YChange::identity) {
        if let Out::YMap(element) = &insert {
            elements.insert(offset, element.clone());
        }
        offset += item_len(&insert);
    }
    elements
}

/// The embed named `name` starting at `index` of editor content, with its
/// attributes.
fn editor_embed_at(contents: &Delta, index: usize, name: &str) -> Option<(Embed, Option<AttributeMap>)> {
    let mut offset = 0;
    for op in &contents.ops {
        if offset == index {
            let embed = op.embed().filter(|embed| embed.name == name)?;
            return Some((embed.clone(), op.attributes().cloned()));
        }
        offset += op.len();
        if offset > index {
            return None;
        }
    }
    None
}

/// A patch that changes nothing.
fn is_empty_patch(patch: &Value) -> bool {
    match patch {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(ops) => ops.is_empty(),
        _ => false,
    }
}

/// Same operations and lengths. Embed payloads only need the same kind.
fn ops_equivalent(applied: &Delta, requested: &Delta) -> bool {
    applied.ops.len() == requested.ops.len()
        && applied
            .ops
            .iter()
            .zip(&requested.ops)
            .all(|(applied, requested)| match (applied, requested) {
                (Op::Insert { value: a, .. }, Op::Insert { value: b, .. }) => match (a, b) {
                    (InsertValue::Text(a), InsertValue::Text(b)) => a == b,
                    (InsertValue::Embed(_), InsertValue::Embed(_)) => true,
                    _ => false,
                },
                (Op::Retain { value: a, .. }, Op::Retain { value: b, .. }) => match (a, b) {
                    (RetainValue::Count(a), RetainValue::Count(b)) => a == b,
                    (RetainValue::Embed(_), RetainValue::Embed(_)) => true,
                    _ => false,
                },
                (Op::Delete(a), Op::Delete(b)) => a == b,
                _ => false,
            })
}

/// Everything but the trailing newline the editor keeps for itself.
fn is_material(change: &Delta, document_len: usize) -> bool {
    let (Some(first), Some(last)) = (change.ops.first(), change.ops.last()) else {
        return false;
    };
    let retains_document = matches!(
        first,
        Op::Retain { value: RetainValue::Count(count), .. } if *count == document_len
    );
    let adds_newline = matches!(
        last,
        Op::Insert { value: InsertValue::Text(text), .. } if text == "\n"
    );
    !(retains_document && adds_newline)
}

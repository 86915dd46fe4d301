//! Compose, diff, transform and invert.

use similar::{Algorithm, DiffTag, capture_diff_slices};
use tracing::warn;

use super::attributes;
use super::handler::EmbedHandlers;
use super::iter::{INFINITY, OpIterator};
use super::op::{InsertValue, Op, OpType, RetainValue};
use super::{Delta, DeltaError};

/// Placeholder character standing in for an embed while diffing.
const EMBED_PLACEHOLDER: char = '\0';

impl Delta {
    /// Apply `other` on top of `self`, using the built-in embed handlers.
    pub fn compose(&self, other: &Delta) -> Delta {
        self.compose_with(other, EmbedHandlers::builtin())
    }

    pub fn compose_with(&self, other: &Delta, handlers: &EmbedHandlers) -> Delta {
        let mut this_iter = OpIterator::new(&self.ops);
        let mut other_iter = OpIterator::new(&other.ops);
        let mut ops = Vec::new();

        // a leading plain retain can skip over our inserts wholesale
        if let Some(Op::Retain {
            value: RetainValue::Count(first_retain),
            attributes: None,
        }) = other_iter.peek()
        {
            let first_retain = *first_retain;
            let mut first_left = first_retain;
            while this_iter.peek_type() == OpType::Insert && this_iter.peek_length() <= first_left {
                first_left -= this_iter.peek_length();
                ops.push(this_iter.next_with_length(INFINITY));
            }
            if first_retain - first_left > 0 {
                other_iter.next_with_length(first_retain - first_left);
            }
        }

        let mut delta = Delta::from_ops(ops);
        while this_iter.has_next() || other_iter.has_next() {
            if other_iter.peek_type() == OpType::Insert {
                delta.push(other_iter.next_with_length(INFINITY));
            } else if this_iter.peek_type() == OpType::Delete {
                delta.push(this_iter.next_with_length(INFINITY));
            } else {
                let length = this_iter.peek_length().min(other_iter.peek_length());
                let this_op = this_iter.next_with_length(length);
                let other_op = other_iter.next_with_length(length);
                match other_op {
                    Op::Retain {
                        value: other_value,
                        attributes: other_attributes,
                    } => {
                        let this_is_change = matches!(
                            this_op,
                            Op::Retain {
                                value: RetainValue::Count(_),
                                ..
                            }
                        );
                        let attributes = attributes::compose(
                            this_op.attributes(),
                            other_attributes.as_ref(),
                            this_is_change,
                        );
                        let new_op =
                            compose_pair(this_op, other_value, length, attributes, handlers);
                        delta.push(new_op.clone());
                        // the rest of other is a plain retain, so the rest of self is kept as is
                        if !other_iter.has_next() && delta.ops.last() == Some(&new_op) {
                            let rest = Delta::from_ops(this_iter.rest());
                            return delta.concat(&rest).chop();
                        }
                    }
                    Op::Delete(count) => {
                        // insert + delete cancels out
                        if matches!(this_op, Op::Retain { .. }) {
                            delta.push(Op::Delete(count));
                        }
                    }
                    Op::Insert { .. } => {}
                }
            }
        }
        delta.chop()
    }

    /// Document delta that turns `self` into `other`. Both must be documents.
    pub fn diff(&self, other: &Delta) -> Result<Delta, DeltaError> {
        if self.ops == other.ops {
            return Ok(Delta::new());
        }
        let old = document_chars(self, "with")?;
        let new = document_chars(other, "on")?;

        let mut result = Delta::new();
        let mut this_iter = OpIterator::new(&self.ops);
        let mut other_iter = OpIterator::new(&other.ops);
        for component in capture_diff_slices(Algorithm::Myers, &old[..], &new[..]) {
            let (tag, old_range, new_range) = component.as_tag_tuple();
            let deleted = units(&old[old_range]);
            let inserted = units(&new[new_range]);
            match tag {
                DiffTag::Equal => {
                    let mut length = deleted;
                    while length > 0 {
                        let op_length = this_iter
                            .peek_length()
                            .min(other_iter.peek_length())
                            .min(length);
                        let this_op = this_iter.next_with_length(op_length);
                        let other_op = other_iter.next_with_length(op_length);
                        if this_op.insert_value() == other_op.insert_value() {
                            result.retain_with(
                                RetainValue::Count(op_length),
                                attributes::diff(this_op.attributes(), other_op.attributes()),
                            );
                        } else {
                            result.push(other_op).delete(op_length);
                        }
                        length -= op_length;
                    }
                }
                DiffTag::Delete | DiffTag::Insert | DiffTag::Replace => {
                    let mut length = deleted;
                    while length > 0 {
                        let op_length = length.min(this_iter.peek_length());
                        this_iter.next_with_length(op_length);
                        result.delete(op_length);
                        length -= op_length;
                    }
                    let mut length = inserted;
                    while length > 0 {
                        let op_length = other_iter.peek_length().min(length);
                        result.push(other_iter.next_with_length(op_length));
                        length -= op_length;
                    }
                }
            }
        }
        Ok(result.chop())
    }

    /// Rebase `other` so it applies after `self`. With `priority`, `self`
    /// is considered to have happened first.
    pub fn transform(&self, other: &Delta, priority: bool) -> Delta {
        self.transform_with(other, priority, EmbedHandlers::builtin())
    }

    pub fn transform_with(&self, other: &Delta, priority: bool, handlers: &EmbedHandlers) -> Delta {
        let mut this_iter = OpIterator::new(&self.ops);
        let mut other_iter = OpIterator::new(&other.ops);
        let mut delta = Delta::new();
        while this_iter.has_next() || other_iter.has_next() {
            if this_iter.peek_type() == OpType::Insert
                && (priority || other_iter.peek_type() != OpType::Insert)
            {
                let op = this_iter.next_with_length(INFINITY);
                delta.retain(op.len());
            } else if other_iter.peek_type() == OpType::Insert {
                delta.push(other_iter.next_with_length(INFINITY));
            } else {
                let length = this_iter.peek_length().min(other_iter.peek_length());
                let this_op = this_iter.next_with_length(length);
                let other_op = other_iter.next_with_length(length);
                if this_op.is_delete() {
                    // our delete makes theirs redundant or removes their retain
                    continue;
                }
                if other_op.is_delete() {
                    delta.push(other_op);
                    continue;
                }
                let attributes =
                    attributes::transform(this_op.attributes(), other_op.attributes(), priority);
                let transformed = match (this_op, other_op) {
                    (
                        Op::Retain {
                            value: RetainValue::Embed(ours),
                            ..
                        },
                        Op::Retain {
                            value: RetainValue::Embed(theirs),
                            ..
                        },
                    ) => RetainValue::Embed(
                        handlers
                            .transform(&ours, &theirs, priority)
                            .unwrap_or(theirs),
                    ),
                    (
                        _,
                        Op::Retain {
                            value: RetainValue::Embed(theirs),
                            ..
                        },
                    ) => RetainValue::Embed(theirs),
                    _ => RetainValue::Count(length),
                };
                delta.retain_with(transformed, attributes);
            }
        }
        delta.chop()
    }

    /// Where `index` ends up once this change is applied.
    pub fn transform_position(&self, index: usize, priority: bool) -> usize {
        let mut iter = OpIterator::new(&self.ops);
        let mut index = index;
        let mut offset = 0;
        while iter.has_next() && offset <= index {
            let length = iter.peek_length();
            let next_type = iter.peek_type();
            iter.next_with_length(INFINITY);
            match next_type {
                OpType::Delete => {
                    index -= length.min(index - offset);
                    continue;
                }
                OpType::Insert if offset < index || !priority => index += length,
                _ => {}
            }
            offset += length;
        }
        index
    }

    /// The change that undoes `self` when applied after it over `base`.
    pub fn invert(&self, base: &Delta) -> Delta {
        self.invert_with(base, EmbedHandlers::builtin())
    }

    pub fn invert_with(&self, base: &Delta, handlers: &EmbedHandlers) -> Delta {
        let mut inverted = Delta::new();
        let mut base_index = 0;
        for op in &self.ops {
            match op {
                Op::Insert { .. } => {
                    inverted.delete(op.len());
                }
                Op::Retain {
                    value: RetainValue::Count(count),
                    attributes: None,
                } => {
                    inverted.retain(*count);
                    base_index += count;
                }
                Op::Delete(_)
                | Op::Retain {
                    value: RetainValue::Count(_),
                    ..
                } => {
                    let length = op.len();
                    for base_op in base.slice(base_index, base_index + length).ops {
                        if op.is_delete() {
                            inverted.push(base_op);
                        } else {
                            inverted.retain_with(
                                RetainValue::Count(base_op.len()),
                                Some(attributes::invert(op.attributes(), base_op.attributes())),
                            );
                        }
                    }
                    base_index += length;
                }
                Op::Retain {
                    value: RetainValue::Embed(change),
                    attributes,
                } => {
                    let slice = base.slice(base_index, base_index + 1);
                    let base_op = OpIterator::new(&slice.ops).next_with_length(INFINITY);
                    let inverted_attributes =
                        Some(attributes::invert(attributes.as_ref(), base_op.attributes()));
                    match base_op.insert_value() {
                        Some(InsertValue::Embed(base_embed)) => {
                            match handlers.invert(change, base_embed) {
                                Some(embed) => inverted
                                    .retain_with(RetainValue::Embed(embed), inverted_attributes),
                                None => inverted
                                    .retain_with(RetainValue::Count(1), inverted_attributes),
                            };
                        }
                        _ => {
                            warn!(embed = %change.name, "cannot invert an embed patch over non-embed content");
                            inverted.retain_with(RetainValue::Count(1), inverted_attributes);
                        }
                    }
                    base_index += 1;
                }
            }
        }
        inverted.chop()
    }
}

fn compose_pair(
    this_op: Op,
    other_value: RetainValue,
    length: usize,
    attributes: Option<super::AttributeMap>,
    handlers: &EmbedHandlers,
) -> Op {
    match (this_op, other_value) {
        (
            Op::Retain {
                value: RetainValue::Count(_),
                ..
            },
            RetainValue::Count(_),
        ) => Op::Retain {
            value: RetainValue::Count(length),
            attributes,
        },
        (
            Op::Retain {
                value: RetainValue::Count(_),
                ..
            },
            other @ RetainValue::Embed(_),
        ) => Op::Retain {
            value: other,
            attributes,
        },
        (Op::Insert { value, .. }, RetainValue::Count(_)) => Op::Insert { value, attributes },
        (Op::Retain { value, .. }, RetainValue::Count(_)) => Op::Retain { value, attributes },
        (
            Op::Insert {
                value: InsertValue::Embed(base),
                ..
            },
            RetainValue::Embed(change),
        ) => {
            let composed = handlers.compose(&base, &change, false).unwrap_or(base);
            Op::Insert {
                value: InsertValue::Embed(composed),
                attributes,
            }
        }
        (
            Op::Retain {
                value: RetainValue::Embed(base),
                ..
            },
            RetainValue::Embed(change),
        ) => {
            let composed = handlers.compose(&base, &change, true).unwrap_or(change);
            Op::Retain {
                value: RetainValue::Embed(composed),
                attributes,
            }
        }
        (Op::Insert { value, .. }, RetainValue::Embed(change)) => {
            warn!(embed = %change.name, "cannot apply an embed patch to text");
            Op::Insert { value, attributes }
        }
        (Op::Delete(count), _) => Op::Delete(count),
    }
}

fn document_chars(delta: &Delta, side: &str) -> Result<Vec<char>, DeltaError> {
    let mut chars = Vec::new();
    for op in &delta.ops {
        match op.insert_value() {
            Some(InsertValue::Text(text)) => chars.extend(text.chars()),
            Some(InsertValue::Embed(_)) => chars.push(EMBED_PLACEHOLDER),
            None => {
                return Err(DeltaError::NotADocument {
                    reason: format!("diff() called {side} non-document"),
                });
            }
        }
    }
    Ok(chars)
}

fn units(chars: &[char]) -> usize {
    chars.iter().map(|c| c.len_utf16()).sum()
}

//! Editor-side rich-text deltas.
//!
//! A [`Delta`] is the editor's content model: a document when it holds only
//! inserts, or a change when it also retains and deletes. This module carries
//! the operational-transform algebra the binding relies on (compose, diff,
//! transform, invert), the embed handlers that extend that algebra into
//! structured embeds such as tables, and [`normalize`] for comparing editor
//! content against the shared document.
//!
//! # Example
//!
//! ```
//! use yquill::delta::Delta;
//!
//! let mut doc = Delta::new();
//! doc.insert("Hello");
//!
//! let mut change = Delta::new();
//! change.retain(5).insert(" world");
//!
//! assert_eq!(doc.compose(&change).text(), "Hello world");
//! ```

mod algebra;
pub mod attributes;
mod errors;
mod handler;
mod iter;
mod normalize;
mod op;
pub mod table;


use serde::{Deserialize, Deserializer, Serialize};

pub use errors::DeltaError;
pub use handler::{EmbedHandler, EmbedHandlers, RichTextHandler};
pub use iter::{INFINITY, OpIterator};
pub use normalize::normalize;
pub use op::{AttributeMap, Embed, InsertValue, Op, OpType, RetainValue, utf16_len};

/// An ordered list of operations.
///
/// Parsing goes through the builder methods, so zero-length ops are dropped
/// and neighbours merged. [`Delta::from_ops`] keeps ops as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Delta {
    pub ops: Vec<Op>,
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut delta = Delta::new();
        for op in Vec::<Op>::deserialize(deserializer)? {
            match op {
                Op::Insert { value, attributes } => delta.insert_with(value, attributes),
                Op::Retain { value, attributes } => delta.retain_with(value, attributes),
                Op::Delete(count) => delta.delete(count),
            };
        }
        Ok(delta)
    }
}

fn non_empty(attributes: Option<AttributeMap>) -> Option<AttributeMap> {
    attributes.filter(|attrs| !attrs.is_empty())
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap raw operations without merging them.
    pub fn from_ops(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn insert(&mut self, text: impl Into<String>) -> &mut Self {
        self.insert_with(InsertValue::Text(text.into()), None)
    }

    pub fn insert_embed(&mut self, embed: Embed) -> &mut Self {
        self.insert_with(InsertValue::Embed(embed), None)
    }

    /// Insert content with attributes. Empty text is dropped.
    pub fn insert_with(
        &mut self,
        value: InsertValue,
        attributes: Option<AttributeMap>,
    ) -> &mut Self {
        if matches!(&value, InsertValue::Text(text) if text.is_empty()) {
            return self;
        }
        self.push(Op::Insert {
            value,
            attributes: non_empty(attributes),
        })
    }

    pub fn retain(&mut self, count: usize) -> &mut Self {
        self.retain_with(RetainValue::Count(count), None)
    }

    pub fn retain_embed(&mut self, embed: Embed) -> &mut Self {
        self.retain_with(RetainValue::Embed(embed), None)
    }

    /// Retain with attributes. Zero-length counts are dropped.
    pub fn retain_with(
        &mut self,
        value: RetainValue,
        attributes: Option<AttributeMap>,
    ) -> &mut Self {
        if matches!(value, RetainValue::Count(0)) {
            return self;
        }
        self.push(Op::Retain {
            value,
            attributes: non_empty(attributes),
        })
    }

    pub fn delete(&mut self, count: usize) -> &mut Self {
        if count == 0 {
            return self;
        }
        self.push(Op::Delete(count))
    }

    /// Append an op, merging it into the previous one where possible.
    ///
    /// Adjacent deletes merge, an insert following a delete is moved in front
    /// of it, and text inserts or count retains with equal attributes merge.
    pub fn push(&mut self, new_op: Op) -> &mut Self {
        let mut index = self.ops.len();
        if let Some(last) = self.ops.last() {
            if let (Op::Delete(a), Op::Delete(b)) = (last, &new_op) {
                let merged = a + b;
                self.ops[index - 1] = Op::Delete(merged);
                return self;
            }
            if last.is_delete() && new_op.is_insert() {
                index -= 1;
                if index == 0 {
                    self.ops.insert(0, new_op);
                    return self;
                }
            }
            if let Some(merged) = merge(&self.ops[index - 1], &new_op) {
                self.ops[index - 1] = merged;
                return self;
            }
        }
        if index == self.ops.len() {
            self.ops.push(new_op);
        } else {
            self.ops.insert(index, new_op);
        }
        self
    }

    /// Drop a trailing plain retain, which is a no-op.
    pub fn chop(mut self) -> Self {
        if let Some(Op::Retain {
            value: RetainValue::Count(_),
            attributes: None,
        }) = self.ops.last()
        {
            self.ops.pop();
        }
        self
    }

    /// Total length of all ops.
    pub fn length(&self) -> usize {
        self.ops.iter().map(Op::len).sum()
    }

    /// Net change in document length this delta causes.
    pub fn change_length(&self) -> isize {
        self.ops
            .iter()
            .map(|op| match op {
                Op::Insert { .. } => op.len() as isize,
                Op::Delete(count) => -(*count as isize),
                Op::Retain { .. } => 0,
            })
            .sum()
    }

    pub fn concat(&self, other: &Delta) -> Delta {
        let mut delta = self.clone();
        if let Some((first, rest)) = other.ops.split_first() {
            delta.push(first.clone());
            delta.ops.extend_from_slice(rest);
        }
        delta
    }

    /// Ops covering `[start, end)`. Pass [`INFINITY`] for an open end.
    pub fn slice(&self, start: usize, end: usize) -> Delta {
        let mut ops = Vec::new();
        let mut iter = OpIterator::new(&self.ops);
        let mut index = 0;
        while index < end && iter.has_next() {
            let next_op = if index < start {
                iter.next_with_length(start - index)
            } else {
                let op = iter.next_with_length(end - index);
                ops.push(op.clone());
                op
            };
            index += next_op.len();
        }
        Delta::from_ops(ops)
    }

    /// Plain text of a document, with embeds skipped.
    pub fn text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| op.insert_value().and_then(InsertValue::as_text))
            .collect()
    }
}

fn merge(last: &Op, new_op: &Op) -> Option<Op> {
    if last.attributes() != new_op.attributes() {
        return None;
    }
    match (last, new_op) {
        (
            Op::Insert {
                value: InsertValue::Text(a),
                ..
            },
            Op::Insert {
                value: InsertValue::Text(b),
                attributes,
            },
        ) => Some(Op::Insert {
            value: InsertValue::Text(format!("{a}{b}")),
            attributes: attributes.clone(),
        }),
        (
            Op::Retain {
                value: RetainValue::Count(a),
                ..
            },
            Op::Retain {
                value: RetainValue::Count(b),
                attributes,
            },
        ) => Some(Op::Retain {
            value: RetainValue::Count(a + b),
            attributes: attributes.clone(),
        }),
        _ => None,
    }
}

impl From<Vec<Op>> for Delta {
    fn from(ops: Vec<Op>) -> Self {
        Delta::from_ops(ops)
    }
}

impl FromIterator<Op> for Delta {
    fn from_iter<T: IntoIterator<Item = Op>>(iter: T) -> Self {
        let mut delta = Delta::new();
        for op in iter {
            delta.push(op);
        }
        delta
    }
}

impl<'a> IntoIterator for &'a Delta {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

//! Delta operations and their JSON wire form.
//!
//! An operation is exactly one of `{"insert": ..}`, `{"retain": ..}` or
//! `{"delete": n}`, with an optional `"attributes"` object on inserts and
//! retains. Inserted content is a string or a single-key embed object; a
//! retain is a count or an embed patch addressed to the embed at that position.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DeltaError;

/// Formatting attributes carried by inserts and retains.
pub type AttributeMap = Map<String, Value>;

/// Length of a string in UTF-16 code units, the unit all delta lengths use.
pub fn utf16_len(s: &str) -> usize {
    s.chars().map(char::len_utf16).sum()
}

/// Slice a string by UTF-16 offsets, snapping to character boundaries.
pub(crate) fn utf16_substr(s: &str, start: usize, len: usize) -> String {
    let end = start.saturating_add(len);
    let mut pos = 0;
    let mut out = String::new();
    for ch in s.chars() {
        if pos >= end {
            break;
        }
        if pos >= start {
            out.push(ch);
        }
        pos += ch.len_utf16();
    }
    out
}

/// An embedded object, `{ "<name>": <data> }` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub name: String,
    pub data: Value,
}

impl Embed {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read an embed out of a JSON object, using its first key as the name.
    pub fn from_map(map: &Map<String, Value>) -> Option<Self> {
        map.iter()
            .next()
            .map(|(name, data)| Embed::new(name.clone(), data.clone()))
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.name.clone(), self.data.clone());
        Value::Object(map)
    }
}

/// Content carried by an insert operation.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertValue {
    Text(String),
    Embed(Embed),
}

impl InsertValue {
    pub fn len(&self) -> usize {
        match self {
            InsertValue::Text(text) => utf16_len(text),
            InsertValue::Embed(_) => 1,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            InsertValue::Text(text) => Some(text),
            InsertValue::Embed(_) => None,
        }
    }

    pub fn as_embed(&self) -> Option<&Embed> {
        match self {
            InsertValue::Embed(embed) => Some(embed),
            InsertValue::Text(_) => None,
        }
    }
}

/// What a retain operation keeps: a run of units or a single patched embed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetainValue {
    Count(usize),
    Embed(Embed),
}

impl RetainValue {
    pub fn len(&self) -> usize {
        match self {
            RetainValue::Count(count) => *count,
            RetainValue::Embed(_) => 1,
        }
    }
}

/// The three kinds of operation, used by iterators to peek ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Insert,
    Retain,
    Delete,
}

/// A single delta operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOp", into = "RawOp")]
pub enum Op {
    Insert {
        value: InsertValue,
        attributes: Option<AttributeMap>,
    },
    Retain {
        value: RetainValue,
        attributes: Option<AttributeMap>,
    },
    Delete(usize),
}

impl Op {
    pub fn insert_text(text: impl Into<String>) -> Self {
        Op::Insert {
            value: InsertValue::Text(text.into()),
            attributes: None,
        }
    }

    pub fn retain_count(count: usize) -> Self {
        Op::Retain {
            value: RetainValue::Count(count),
            attributes: None,
        }
    }

    /// Length in UTF-16 units. Embeds count as one.
    pub fn len(&self) -> usize {
        match self {
            Op::Insert { value, .. } => value.len(),
            Op::Retain { value, .. } => value.len(),
            Op::Delete(count) => *count,
        }
    }

    pub fn op_type(&self) -> OpType {
        match self {
            Op::Insert { .. } => OpType::Insert,
            Op::Retain { .. } => OpType::Retain,
            Op::Delete(_) => OpType::Delete,
        }
    }

    pub fn attributes(&self) -> Option<&AttributeMap> {
        match self {
            Op::Insert { attributes, .. } | Op::Retain { attributes, .. } => attributes.as_ref(),
            Op::Delete(_) => None,
        }
    }

    pub fn insert_value(&self) -> Option<&InsertValue> {
        match self {
            Op::Insert { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Op::Insert { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Op::Delete(_))
    }

    /// The embed this op inserts or patches, if any.
    pub fn embed(&self) -> Option<&Embed> {
        match self {
            Op::Insert {
                value: InsertValue::Embed(embed),
                ..
            }
            | Op::Retain {
                value: RetainValue::Embed(embed),
                ..
            } => Some(embed),
            _ => None,
        }
    }
}

/// Flat JSON shape used for (de)serializing [`Op`].
#[derive(Serialize, Deserialize)]
struct RawOp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retain: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<AttributeMap>,
}

impl TryFrom<RawOp> for Op {
    type Error = DeltaError;

    fn try_from(raw: RawOp) -> Result<Self, Self::Error> {
        let attributes = raw.attributes;
        match (raw.insert, raw.retain, raw.delete) {
            (Some(Value::String(text)), None, None) => Ok(Op::Insert {
                value: InsertValue::Text(text),
                attributes,
            }),
            (Some(Value::Object(map)), None, None) => {
                let embed = Embed::from_map(&map).ok_or_else(|| DeltaError::InvalidOp {
                    reason: "insert of an empty object".to_string(),
                })?;
                Ok(Op::Insert {
                    value: InsertValue::Embed(embed),
                    attributes,
                })
            }
            (None, Some(Value::Number(count)), None) => {
                let count = count.as_u64().ok_or_else(|| DeltaError::InvalidOp {
                    reason: format!("retain count {count} is not a non-negative integer"),
                })?;
                Ok(Op::Retain {
                    value: RetainValue::Count(count as usize),
                    attributes,
                })
            }
            (None, Some(Value::Object(map)), None) => {
                let embed = Embed::from_map(&map).ok_or_else(|| DeltaError::InvalidOp {
                    reason: "retain of an empty object".to_string(),
                })?;
                Ok(Op::Retain {
                    value: RetainValue::Embed(embed),
                    attributes,
                })
            }
            (None, None, Some(count)) => Ok(Op::Delete(count)),
            (insert, retain, delete) => Err(DeltaError::InvalidOp {
                reason: format!(
                    "expected exactly one of insert, retain or delete (insert: {}, retain: {}, delete: {})",
                    insert.is_some(),
                    retain.is_some(),
                    delete.is_some()
                ),
            }),
        }
    }
}

impl From<Op> for RawOp {
    fn from(op: Op) -> Self {
        let empty = RawOp {
            insert: None,
            retain: None,
            delete: None,
            attributes: None,
        };
        match op {
            Op::Insert { value, attributes } => RawOp {
                insert: Some(match value {
                    InsertValue::Text(text) => Value::String(text),
                    InsertValue::Embed(embed) => embed.to_value(),
                }),
                attributes,
                ..empty
            },
            Op::Retain { value, attributes } => RawOp {
                retain: Some(match value {
                    RetainValue::Count(count) => Value::from(count),
                    RetainValue::Embed(embed) => embed.to_value(),
                }),
                attributes,
                ..empty
            },
            Op::Delete(count) => RawOp {
                delete: Some(count),
                ..empty
            },
        }
    }
}

//! Cursor over a slice of operations that can split ops at arbitrary lengths.

use super::op::{InsertValue, Op, OpType, RetainValue, utf16_substr};

/// Stand-in for an unbounded length. An exhausted iterator yields an
/// infinite retain so the algebra can treat both sides uniformly.
pub const INFINITY: usize = usize::MAX;

#[derive(Debug, Clone)]
pub struct OpIterator<'a> {
    ops: &'a [Op],
    index: usize,
    offset: usize,
}

impl<'a> OpIterator<'a> {
    pub fn new(ops: &'a [Op]) -> Self {
        Self {
            ops,
            index: 0,
            offset: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.peek_length() < INFINITY
    }

    /// Take up to `length` units from the current op. A zero length takes
    /// the remainder of the op.
    pub fn next_with_length(&mut self, length: usize) -> Op {
        let length = if length == 0 { INFINITY } else { length };
        let Some(next_op) = self.ops.get(self.index) else {
            return Op::retain_count(INFINITY);
        };
        let offset = self.offset;
        let op_length = next_op.len();
        let length = if length >= op_length - offset {
            self.index += 1;
            self.offset = 0;
            op_length - offset
        } else {
            self.offset += length;
            length
        };
        match next_op {
            Op::Delete(_) => Op::Delete(length),
            Op::Retain {
                value: RetainValue::Count(_),
                attributes,
            } => Op::Retain {
                value: RetainValue::Count(length),
                attributes: attributes.clone(),
            },
            Op::Insert {
                value: InsertValue::Text(text),
                attributes,
            } => Op::Insert {
                value: InsertValue::Text(utf16_substr(text, offset, length)),
                attributes: attributes.clone(),
            },
            // embeds have length one, so they are never split
            other => other.clone(),
        }
    }

    pub fn peek(&self) -> Option<&'a Op> {
        self.ops.get(self.index)
    }

    pub fn peek_length(&self) -> usize {
        match self.ops.get(self.index) {
            Some(op) => op.len() - self.offset,
            None => INFINITY,
        }
    }

    pub fn peek_type(&self) -> OpType {
        self.ops
            .get(self.index)
            .map(Op::op_type)
            .unwrap_or(OpType::Retain)
    }

    /// Everything left, without advancing.
    pub fn rest(&mut self) -> Vec<Op> {
        if !self.has_next() {
            return Vec::new();
        }
        if self.offset == 0 {
            return self.ops[self.index..].to_vec();
        }
        let (offset, index) = (self.offset, self.index);
        let mut rest = vec![self.next_with_length(INFINITY)];
        rest.extend_from_slice(&self.ops[self.index..]);
        self.offset = offset;
        self.index = index;
        rest
    }
}

impl Iterator for OpIterator<'_> {
    type Item = Op;

    fn next(&mut self) -> Option<Op> {
        self.has_next().then(|| self.next_with_length(INFINITY))
    }
}

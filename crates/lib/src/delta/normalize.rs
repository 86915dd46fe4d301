use super::Delta;
use super::op::{InsertValue, Op};

/// Strip the trailing run of newlines from a final unformatted text insert.
///
/// Editors always keep a terminal newline that the shared document may not
/// store, so both sides are normalized before comparing them. The final op
/// is dropped entirely when only newlines were left in it, and stripping
/// continues into the op before it so the result is stable under repeated
/// normalization even for unmerged input.
pub fn normalize(delta: &Delta) -> Delta {
    let mut normalized = delta.clone();
    while let Some(Op::Insert {
        value: InsertValue::Text(text),
        attributes: None,
    }) = normalized.ops.last_mut()
    {
        if !text.ends_with('\n') {
            break;
        }
        let trimmed_len = text.trim_end_matches('\n').len();
        text.truncate(trimmed_len);
        if !text.is_empty() {
            break;
        }
        normalized.ops.pop();
    }
    normalized
}

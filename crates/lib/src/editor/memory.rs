use tracing::trace;

use super::{ChangeSource, Editor, Selection};
use crate::delta::{AttributeMap, Delta, EmbedHandlers, InsertValue, Op};
use crate::presence::{CursorLayer, CursorRenderer};

/// A headless editor holding its content in memory.
///
/// It behaves like a browser editor where that matters to a binding: the
/// content always ends with a newline, `null` and `false` attributes never
/// end up on content, and the selection follows every change.
#[derive(Debug, Clone)]
pub struct MemoryEditor {
    contents: Delta,
    handlers: EmbedHandlers,
    selection: Option<Selection>,
    cursors: Option<CursorLayer>,
}

impl Default for MemoryEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEditor {
    pub fn new() -> Self {
        Self::with_handlers(EmbedHandlers::with_defaults())
    }

    pub fn with_handlers(handlers: EmbedHandlers) -> Self {
        let mut contents = Delta::new();
        contents.insert("\n");
        Self {
            contents,
            handlers,
            selection: None,
            cursors: None,
        }
    }

    /// Show remote cursors in a [`CursorLayer`].
    pub fn with_cursors(mut self) -> Self {
        self.cursors = Some(CursorLayer::new());
        self
    }

    pub fn cursor_layer(&self) -> Option<&CursorLayer> {
        self.cursors.as_ref()
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection.map(|selection| self.clamp(selection));
    }

    pub fn handlers(&self) -> &EmbedHandlers {
        &self.handlers
    }

    fn clamp(&self, selection: Selection) -> Selection {
        let last = self.contents.length().saturating_sub(1);
        let index = selection.index.min(last);
        let length = selection.length.min(last - index);
        Selection::new(index, length)
    }

    fn apply(&mut self, change: &Delta, source: &ChangeSource) -> Delta {
        let mut change = strip_unset_attributes(change);
        let mut contents = self.contents.compose_with(&change, &self.handlers);
        if !ends_with_newline(&contents) {
            let mut newline = Delta::new();
            newline.retain(contents.length()).insert("\n");
            contents = contents.compose(&newline);
            change = change.compose(&newline);
        }
        self.contents = contents;

        // Remote and programmatic changes at the caret push it forward.
        let priority = matches!(source, ChangeSource::User);
        if let Some(selection) = self.selection {
            let start = change.transform_position(selection.index, priority);
            let end = change.transform_position(selection.end(), priority);
            self.selection = Some(self.clamp(Selection::new(start, end.saturating_sub(start))));
        }
        trace!(ops = change.ops.len(), "editor applied change");
        change
    }
}

impl Editor for MemoryEditor {
    fn update_contents(&mut self, change: &Delta, source: &ChangeSource) -> Delta {
        self.apply(change, source)
    }

    fn set_contents(&mut self, contents: &Delta, source: &ChangeSource) -> Delta {
        let mut change = Delta::new();
        change.delete(self.contents.length());
        for op in &contents.ops {
            change.push(op.clone());
        }
        self.apply(&change, source)
    }

    fn contents(&self) -> Delta {
        self.contents.clone()
    }

    fn length(&self) -> usize {
        self.contents.length()
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn cursors(&mut self) -> Option<&mut dyn CursorRenderer> {
        self.cursors
            .as_mut()
            .map(|layer| layer as &mut dyn CursorRenderer)
    }
}

fn ends_with_newline(contents: &Delta) -> bool {
    matches!(
        contents.ops.last(),
        Some(Op::Insert { value: InsertValue::Text(text), .. }) if text.ends_with('\n')
    )
}

/// Inserted content never carries attributes that are unset.
fn strip_unset_attributes(change: &Delta) -> Delta {
    change
        .ops
        .iter()
        .map(|op| match op {
            Op::Insert { value, attributes } => {
                let attributes = attributes.as_ref().map(|attributes| {
                    attributes
                        .iter()
                        .filter(|(_, value)| !value.is_null() && value.as_bool() != Some(false))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                });
                Op::Insert {
                    value: value.clone(),
                    attributes: attributes.filter(|map: &AttributeMap| !map.is_empty()),
                }
            }
            other => other.clone(),
        })
        .collect()
}

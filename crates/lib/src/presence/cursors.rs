//! Rendering of remote cursors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use yrs::{ReadTxn, TextRef};

use super::{ClientId, PeerState};
use crate::editor::Selection;
use crate::position::resolve_selection;

/// Something that can draw labelled remote cursors over an editor.
pub trait CursorRenderer {
    /// Create the cursor if it is missing, otherwise relabel it.
    fn create_cursor(&mut self, id: ClientId, name: &str, color: &str);

    fn move_cursor(&mut self, id: ClientId, range: Selection);

    fn remove_cursor(&mut self, id: ClientId);
}

/// Label and color used when a peer doesn't share its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorDefaults {
    pub color: String,
    /// Prefix of the generated label; the client id follows it.
    pub name_prefix: String,
}

impl Default for CursorDefaults {
    fn default() -> Self {
        Self {
            color: "#ffa500".to_string(),
            name_prefix: "User: ".to_string(),
        }
    }
}

impl CursorDefaults {
    pub fn label(&self, client: ClientId) -> String {
        format!("{}{client}", self.name_prefix)
    }
}

/// A cursor drawn by [`CursorLayer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCursor {
    pub name: String,
    pub color: String,
    pub range: Option<Selection>,
}

/// In-memory [`CursorRenderer`].
#[derive(Debug, Clone, Default)]
pub struct CursorLayer {
    cursors: BTreeMap<ClientId, RenderedCursor>,
}

impl CursorLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ClientId) -> Option<&RenderedCursor> {
        self.cursors.get(&id)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &RenderedCursor)> {
        self.cursors.iter()
    }
}

impl CursorRenderer for CursorLayer {
    fn create_cursor(&mut self, id: ClientId, name: &str, color: &str) {
        let cursor = self.cursors.entry(id).or_insert_with(|| RenderedCursor {
            name: String::new(),
            color: String::new(),
            range: None,
        });
        cursor.name = name.to_string();
        cursor.color = color.to_string();
    }

    fn move_cursor(&mut self, id: ClientId, range: Selection) {
        if let Some(cursor) = self.cursors.get_mut(&id) {
            cursor.range = Some(range);
        }
    }

    fn remove_cursor(&mut self, id: ClientId) {
        self.cursors.remove(&id);
    }
}

/// Draw, move or remove the cursor of one peer.
///
/// A peer whose cursor no longer resolves into `text` has no visible cursor.
pub fn render_peer<T: ReadTxn>(
    renderer: &mut dyn CursorRenderer,
    defaults: &CursorDefaults,
    txn: &T,
    text: &TextRef,
    client: ClientId,
    state: Option<&PeerState>,
) {
    let selection = state
        .and_then(|state| state.cursor.as_ref())
        .and_then(|cursor| resolve_selection(txn, text, cursor));
    let Some(selection) = selection else {
        renderer.remove_cursor(client);
        return;
    };
    let user = state.and_then(|state| state.user.as_ref());
    let name = user
        .and_then(|user| user.name.clone())
        .unwrap_or_else(|| defaults.label(client));
    let color = user
        .and_then(|user| user.color.clone())
        .unwrap_or_else(|| defaults.color.clone());
    renderer.create_cursor(client, &name, &color);
    renderer.move_cursor(client, selection);
}

//! Embeds stored as structured shared types.
//!
//! A registered embed lives in the document as a map tagged with its name
//! under [`EMBED_NAME_KEY`]. The editor sees it as an embed insert whose
//! payload comes from [`EmbedDefinition::type_to_delta`], and edits inside it
//! travel as embed retains produced by [`EmbedDefinition::events_to_delta`].
//! Embeds without a definition are stored as plain values.
//!
//! `events_to_delta` is a fast path. After every batch the binding compares
//! the editor's copy of each changed embed with `type_to_delta` and sends the
//! [`EmbedDefinition::diff`] between them when they disagree.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use yrs::types::{Event, PathSegment};
use yrs::{Any, Map, MapPrelim, MapRef, Out, ReadTxn, TextPrelim, TextRef, TransactionMut};

mod errors;
mod repair;
mod rich_text;
mod table;

pub use errors::{Axis, EmbedError};
pub use repair::{Repair, Repairs};
pub use rich_text::RichTextEmbed;
pub use table::TableEmbed;

pub(crate) use repair::{duplicate_positions, item_len, line_item_id};

/// Key of the element map that holds the embed's name.
pub const EMBED_NAME_KEY: &str = "$name";

/// A deep event re-rooted at an embed element.
///
/// `path` is the event's path below the element; an empty path means the
/// event targets the element map itself.
#[derive(Clone)]
pub struct ScopedEvent<'a> {
    pub path: Vec<PathSegment>,
    pub event: &'a Event,
}

impl fmt::Debug for ScopedEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedEvent")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ScopedEvent<'_> {
    /// The path as keys, or `None` if it passes through an index.
    pub fn keys(&self) -> Option<Vec<&str>> {
        self.path
            .iter()
            .map(|segment| match segment {
                PathSegment::Key(key) => Some(key.as_ref()),
                PathSegment::Index(_) => None,
            })
            .collect()
    }
}

/// How one kind of embed is stored and synchronized.
pub trait EmbedDefinition: Send + Sync {
    /// Write an editor patch into the element.
    ///
    /// Called right after a fresh element is inserted and for every retain
    /// carrying this embed. Parts that can't be applied are dropped and
    /// reported through the returned error; the rest is still written.
    fn update(
        &self,
        txn: &mut TransactionMut,
        element: &MapRef,
        patch: &Value,
        repairs: &mut Repairs,
    ) -> Result<(), EmbedError>;

    /// The editor patch for a batch of changes inside the element.
    fn events_to_delta(
        &self,
        txn: &TransactionMut,
        element: &MapRef,
        events: &[ScopedEvent<'_>],
        repairs: &mut Repairs,
    ) -> Value;

    /// The editor payload for the element's full content.
    fn type_to_delta(&self, txn: &TransactionMut, element: &MapRef, repairs: &mut Repairs) -> Value;

    /// The patch that turns editor payload `current` into `target`, both in
    /// the shape [`type_to_delta`](Self::type_to_delta) produces.
    ///
    /// The binding uses it to correct an editor whose copy of the embed
    /// drifted from the document. `None` makes it replace the embed whole.
    fn diff(&self, _current: &Value, _target: &Value) -> Option<Value> {
        None
    }
}

/// Embed definitions by name.
#[derive(Clone, Default)]
pub struct EmbedRegistry {
    definitions: HashMap<String, Arc<dyn EmbedDefinition>>,
}

impl fmt::Debug for EmbedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.definitions.keys().collect();
        names.sort();
        f.debug_struct("EmbedRegistry")
            .field("definitions", &names)
            .finish()
    }
}

impl EmbedRegistry {
    /// A registry with no definitions; every embed is stored as a value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables and nested rich text.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_embed(crate::delta::table::TABLE_EMBED, TableEmbed)
            .with_embed(crate::delta::RichTextHandler::NAME, RichTextEmbed)
    }

    pub fn with_embed(mut self, name: impl Into<String>, definition: impl EmbedDefinition + 'static) -> Self {
        self.register(name, Arc::new(definition));
        self
    }

    pub fn register(&mut self, name: impl Into<String>, definition: Arc<dyn EmbedDefinition>) {
        self.definitions.insert(name.into(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn EmbedDefinition>> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Name stored on an embed element.
pub fn element_name<T: ReadTxn>(txn: &T, element: &MapRef) -> Option<String> {
    match element.get(txn, EMBED_NAME_KEY) {
        Some(Out::Any(Any::String(name))) => Some(name.to_string()),
        _ => None,
    }
}

pub(crate) fn get_or_insert_text(txn: &mut TransactionMut, map: &MapRef, key: &str) -> TextRef {
    match map.get(&*txn, key) {
        Some(Out::YText(text)) => text,
        _ => map.insert(txn, key, TextPrelim::new("")),
    }
}

pub(crate) fn get_or_insert_map(txn: &mut TransactionMut, map: &MapRef, key: &str) -> MapRef {
    match map.get(&*txn, key) {
        Some(Out::YMap(inner)) => inner,
        _ => map.insert(txn, key, MapPrelim::default()),
    }
}

pub(crate) fn get_text<T: ReadTxn>(txn: &T, map: &MapRef, key: &str) -> Option<TextRef> {
    match map.get(txn, key) {
        Some(Out::YText(text)) => Some(text),
        _ => None,
    }
}

pub(crate) fn get_map<T: ReadTxn>(txn: &T, map: &MapRef, key: &str) -> Option<MapRef> {
    match map.get(txn, key) {
        Some(Out::YMap(inner)) => Some(inner),
        _ => None,
    }
}

//! Embed handlers extend the delta algebra into embedded objects.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tracing::warn;

use super::Delta;
use super::op::Embed;
use super::table::{TABLE_EMBED, TableHandler};

/// Algebra for the payload of one embed type.
///
/// Each method works on the embed's data (the value under its name), never on
/// the `{ name: data }` wrapper.
pub trait EmbedHandler: Send + Sync {
    /// Apply `change` on top of `base`. `keep_null` is set when `base` is
    /// itself a change rather than inserted content.
    fn compose(&self, base: &Value, change: &Value, keep_null: bool) -> Value;

    /// Rebase `other` over a concurrent `ours`.
    fn transform(&self, ours: &Value, other: &Value, priority: bool) -> Value;

    /// The change that undoes `change` applied over `base`.
    fn invert(&self, change: &Value, base: &Value) -> Value;
}

/// Handlers keyed by embed name.
#[derive(Clone, Default)]
pub struct EmbedHandlers {
    handlers: HashMap<String, Arc<dyn EmbedHandler>>,
}

impl fmt::Debug for EmbedHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("EmbedHandlers")
            .field("handlers", &names)
            .finish()
    }
}

impl EmbedHandlers {
    /// Create an empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for the embeds this crate ships: tables and nested rich text.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_handler(TABLE_EMBED, TableHandler)
            .with_handler(RichTextHandler::NAME, RichTextHandler)
    }

    /// Shared instance of [`EmbedHandlers::with_defaults`].
    pub fn builtin() -> &'static EmbedHandlers {
        static BUILTIN: OnceLock<EmbedHandlers> = OnceLock::new();
        BUILTIN.get_or_init(EmbedHandlers::with_defaults)
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: impl EmbedHandler + 'static) -> Self {
        self.register(name, Arc::new(handler));
        self
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn EmbedHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn EmbedHandler>> {
        self.handlers.get(name)
    }

    fn matching(&self, a: &Embed, b: &Embed, operation: &str) -> Option<&Arc<dyn EmbedHandler>> {
        if a.name != b.name {
            warn!(left = %a.name, right = %b.name, operation, "embed types do not match");
            return None;
        }
        let handler = self.handlers.get(&a.name);
        if handler.is_none() {
            warn!(embed = %a.name, operation, "no handler registered for embed");
        }
        handler
    }

    pub(crate) fn compose(&self, base: &Embed, change: &Embed, keep_null: bool) -> Option<Embed> {
        let handler = self.matching(base, change, "compose")?;
        Some(Embed::new(
            base.name.clone(),
            handler.compose(&base.data, &change.data, keep_null),
        ))
    }

    pub(crate) fn transform(&self, ours: &Embed, other: &Embed, priority: bool) -> Option<Embed> {
        // a missing handler on transform silently keeps the other side
        if ours.name != other.name {
            return None;
        }
        let handler = self.handlers.get(&ours.name)?;
        Some(Embed::new(
            ours.name.clone(),
            handler.transform(&ours.data, &other.data, priority),
        ))
    }

    pub(crate) fn invert(&self, change: &Embed, base: &Embed) -> Option<Embed> {
        let handler = self.matching(change, base, "invert")?;
        Some(Embed::new(
            change.name.clone(),
            handler.invert(&change.data, &base.data),
        ))
    }
}

/// Parse an embed payload, logging and falling back to the default on junk.
pub(crate) fn parse_payload<T>(value: &Value, embed: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    if value.is_null() {
        return T::default();
    }
    serde_json::from_value(value.clone()).unwrap_or_else(|err| {
        warn!(embed, error = %err, "malformed embed payload");
        T::default()
    })
}

pub(crate) fn to_payload<T: serde::Serialize>(value: &T, embed: &str) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        warn!(embed, error = %err, "failed to serialize embed payload");
        Value::Null
    })
}

/// Nested rich text: the payload is itself a delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct RichTextHandler;

impl RichTextHandler {
    pub const NAME: &'static str = "delta";
}

impl EmbedHandler for RichTextHandler {
    fn compose(&self, base: &Value, change: &Value, _keep_null: bool) -> Value {
        let base: Delta = parse_payload(base, Self::NAME);
        let change: Delta = parse_payload(change, Self::NAME);
        to_payload(&base.compose(&change), Self::NAME)
    }

    fn transform(&self, ours: &Value, other: &Value, priority: bool) -> Value {
        let ours: Delta = parse_payload(ours, Self::NAME);
        let other: Delta = parse_payload(other, Self::NAME);
        to_payload(&ours.transform(&other, priority), Self::NAME)
    }

    fn invert(&self, change: &Value, base: &Value) -> Value {
        let change: Delta = parse_payload(change, Self::NAME);
        let base: Delta = parse_payload(base, Self::NAME);
        to_payload(&change.invert(&base), Self::NAME)
    }
}

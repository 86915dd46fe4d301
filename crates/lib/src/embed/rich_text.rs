//! Nested rich text stored as a text under the element's `text` key.

use serde_json::Value;
use tracing::warn;
use yrs::types::Event;
use yrs::{MapRef, TransactionMut};

use super::{EmbedDefinition, EmbedError, Repairs, ScopedEvent, get_or_insert_text, get_text};
use crate::convert;
use crate::delta::{Delta, RichTextHandler};

const TEXT: &str = "text";

/// Embed definition for `{"delta": [...]}` inserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct RichTextEmbed;

impl EmbedDefinition for RichTextEmbed {
    fn update(
        &self,
        txn: &mut TransactionMut,
        element: &MapRef,
        patch: &Value,
        _repairs: &mut Repairs,
    ) -> Result<(), EmbedError> {
        let change: Delta =
            serde_json::from_value(patch.clone()).map_err(|err| EmbedError::MalformedPatch {
                embed: RichTextHandler::NAME.to_string(),
                reason: err.to_string(),
            })?;
        let text = get_or_insert_text(txn, element, TEXT);
        convert::apply_delta(txn, &text, &change);
        Ok(())
    }

    fn events_to_delta(
        &self,
        txn: &TransactionMut,
        _element: &MapRef,
        events: &[ScopedEvent<'_>],
        _repairs: &mut Repairs,
    ) -> Value {
        let mut delta = Delta::new();
        for scoped in events {
            match (scoped.keys().as_deref(), scoped.event) {
                (Some([TEXT]), Event::Text(event)) => {
                    // A transaction reports each changed text once.
                    delta = convert::event_delta(event.delta(txn));
                }
                _ => warn!(path = ?scoped.path, "ignoring unexpected event inside rich text embed"),
            }
        }
        serde_json::to_value(&delta).unwrap_or(Value::Null)
    }

    fn type_to_delta(&self, txn: &TransactionMut, element: &MapRef, _repairs: &mut Repairs) -> Value {
        let delta = get_text(txn, element, TEXT)
            .map(|text| convert::text_content(txn, &text))
            .unwrap_or_default();
        serde_json::to_value(&delta).unwrap_or(Value::Null)
    }

    fn diff(&self, current: &Value, target: &Value) -> Option<Value> {
        let current: Delta = serde_json::from_value(current.clone()).ok()?;
        let target: Delta = serde_json::from_value(target.clone()).ok()?;
        match current.diff(&target) {
            Ok(change) => serde_json::to_value(&change).ok(),
            Err(err) => {
                warn!(%err, "cannot diff rich text embed");
                None
            }
        }
    }
}

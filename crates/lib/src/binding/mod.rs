//! Two-way synchronisation between a shared text and an editor.
//!
//! Local editor changes are written into the document inside transactions
//! tagged with the binding's [`OriginToken`]. Document changes from anyone
//! else are translated into editor deltas. The tag is how the binding
//! recognises, and skips, the echo of its own writes.
//!
//! Observers can't write to the document, so writes discovered while
//! reacting to a change (repairs, implicit editor changes, cursor
//! publication) are queued and run by [`Binding::flush`]. Every entry point
//! that changes something flushes on its own; hosts writing to the document
//! directly call [`Binding::flush`] afterwards.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::{DeepObservable, Doc, OffsetKind, Origin, ReadTxn, Subscription, TextRef, Transact, Update};

use crate::Result;
use crate::delta::{AttributeMap, Delta};
use crate::editor::{ChangeSource, Editor};
use crate::embed::{EmbedRegistry, Repairs};
use crate::position::relative_selection;
use crate::presence::{Awareness, AwarenessChange, ClientId, CursorDefaults, render_peer};

mod errors;
mod inbound;
mod options;
mod outbound;

pub use errors::BindingError;
pub use options::BindingOptions;

/// Rounds of deferred writes before [`Binding::flush`] gives up.
const MAX_FLUSH_ROUNDS: usize = 16;

/// Opaque token identifying the writes of one binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OriginToken(Arc<str>);

impl OriginToken {
    pub fn new() -> Self {
        Self(Arc::from(format!("yquill-{}", Uuid::new_v4())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OriginToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OriginToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&OriginToken> for Origin {
    fn from(token: &OriginToken) -> Self {
        Origin::from(token.as_str())
    }
}

/// Lifecycle of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Active,
    Destroyed,
}

/// What the document observer needs besides the mutable state.
struct Context {
    text: TextRef,
    token: OriginToken,
    origin: Origin,
    awareness: Option<Arc<dyn Awareness>>,
}

/// Writes waiting for [`Binding::flush`].
#[derive(Debug, Default)]
struct Pending {
    repairs: Repairs,
    fold_back: Vec<Delta>,
    cursor: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.repairs.is_empty() && self.fold_back.is_empty() && !self.cursor
    }
}

struct Inner<E> {
    editor: E,
    embeds: EmbedRegistry,
    cursor_defaults: CursorDefaults,
    /// Every attribute the editor has used, mapped to `false`. Merged under
    /// remote inserts so they never inherit formatting.
    negated_formats: AttributeMap,
    pending: Pending,
}

fn lock<E>(inner: &Mutex<Inner<E>>) -> MutexGuard<'_, Inner<E>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: Editor> Inner<E> {
    fn render_cursors<T, I>(&mut self, txn: &T, ctx: &Context, clients: I)
    where
        T: ReadTxn,
        I: IntoIterator<Item = ClientId>,
    {
        let Some(awareness) = ctx.awareness.as_deref() else {
            return;
        };
        let own = awareness.client_id();
        let states = awareness.states();
        let defaults = &self.cursor_defaults;
        let Some(renderer) = self.editor.cursors() else {
            return;
        };
        for client in clients {
            // The local cursor is the editor's own selection.
            if client == own {
                continue;
            }
            render_peer(renderer, defaults, txn, &ctx.text, client, states.get(&client));
        }
    }

    fn render_all_cursors<T: ReadTxn>(&mut self, txn: &T, ctx: &Context) {
        let clients: Vec<ClientId> = match ctx.awareness.as_deref() {
            Some(awareness) => awareness.states().into_keys().collect(),
            None => return,
        };
        self.render_cursors(txn, ctx, clients);
    }

    fn remove_cursors(&mut self, clients: &[ClientId]) {
        if let Some(renderer) = self.editor.cursors() {
            for &client in clients {
                renderer.remove_cursor(client);
            }
        }
    }
}

/// Keeps an editor and a shared text in sync.
pub struct Binding<E: Editor + 'static> {
    doc: Doc,
    context: Arc<Context>,
    inner: Arc<Mutex<Inner<E>>>,
    subscription: Option<Subscription>,
}

impl<E: Editor + 'static> fmt::Debug for Binding<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("origin", &self.context.token)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<E: Editor + 'static> Binding<E> {
    /// Bind `editor` to `text`.
    ///
    /// The editor's content is replaced with the document's before anything
    /// is observed. `doc` must count offsets in UTF-16 code units, like the
    /// editor does.
    pub fn new(
        doc: &Doc,
        text: TextRef,
        editor: E,
        awareness: Option<Arc<dyn Awareness>>,
        options: BindingOptions,
    ) -> Result<Self> {
        let offset_kind = doc.offset_kind();
        if !matches!(offset_kind, OffsetKind::Utf16) {
            return Err(BindingError::UnsupportedOffsetKind {
                found: format!("{offset_kind:?}"),
            }
            .into());
        }

        let token = OriginToken::new();
        let context = Arc::new(Context {
            text,
            origin: Origin::from(&token),
            token,
            awareness,
        });
        let mut inner = Inner {
            editor,
            embeds: options.embeds,
            cursor_defaults: options.cursors,
            negated_formats: AttributeMap::new(),
            pending: Pending::default(),
        };
        {
            let txn = doc.transact_mut_with(context.origin.clone());
            inner.load_document(&txn, &context);
            inner.render_all_cursors(&txn, &context);
        }

        let inner = Arc::new(Mutex::new(inner));
        let observer_inner = Arc::clone(&inner);
        let observer_context = Arc::clone(&context);
        let subscription = context.text.observe_deep(move |txn, events| {
            if txn.origin() == Some(&observer_context.origin) {
                return;
            }
            lock(&observer_inner).apply_document_events(txn, events, &observer_context);
        });

        let binding = Self {
            doc: doc.clone(),
            context,
            inner,
            subscription: Some(subscription),
        };
        info!(origin = %binding.context.token, "binding created");
        binding.flush()?;
        Ok(binding)
    }

    pub fn state(&self) -> BindingState {
        if self.subscription.is_some() {
            BindingState::Active
        } else {
            BindingState::Destroyed
        }
    }

    pub fn origin(&self) -> &OriginToken {
        &self.context.token
    }

    pub fn text(&self) -> &TextRef {
        &self.context.text
    }

    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Borrow the editor. Changes made through the guard are not synced;
    /// report them with [`Binding::handle_editor_change`] once it's dropped.
    pub fn editor(&self) -> EditorGuard<'_, E> {
        EditorGuard {
            guard: lock(&self.inner),
        }
    }

    pub fn with_editor<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut lock(&self.inner).editor)
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state() {
            BindingState::Active => Ok(()),
            BindingState::Destroyed => Err(BindingError::Destroyed.into()),
        }
    }

    /// Sync a change the editor already made.
    pub fn handle_editor_change(&self, change: &Delta, source: ChangeSource) -> Result<()> {
        self.ensure_active()?;
        {
            let mut inner = lock(&self.inner);
            inner.record_formats(change);
            if !source.is_binding(&self.context.token) {
                let mut txn = self.doc.transact_mut_with(self.context.origin.clone());
                inner.write_change(&mut txn, &self.context, change);
            }
            inner.pending.cursor = true;
        }
        self.flush()
    }

    /// Apply `change` to the editor as a user edit and sync what it did.
    pub fn apply_local(&self, change: &Delta) -> Result<Delta> {
        self.ensure_active()?;
        let applied = lock(&self.inner)
            .editor
            .update_contents(change, &ChangeSource::User);
        self.handle_editor_change(&applied, ChangeSource::User)?;
        Ok(applied)
    }

    /// Publish the editor's selection after it moved.
    pub fn handle_selection_change(&self) -> Result<()> {
        self.ensure_active()?;
        lock(&self.inner).pending.cursor = true;
        self.flush()
    }

    /// Apply a v1-encoded update from a peer.
    pub fn apply_remote_update(&self, update: &[u8]) -> Result<()> {
        self.ensure_active()?;
        let update = Update::decode_v1(update).map_err(|err| BindingError::UpdateDecode {
            reason: err.to_string(),
        })?;
        {
            let mut txn = self.doc.transact_mut();
            txn.apply_update(update)
                .map_err(|err| BindingError::UpdateApply {
                    reason: err.to_string(),
                })?;
        }
        self.flush()
    }

    /// Redraw the cursors of peers whose presence changed.
    pub fn handle_awareness_change(&self, change: &AwarenessChange) -> Result<()> {
        self.ensure_active()?;
        let txn = self.doc.transact();
        let mut inner = lock(&self.inner);
        let clients = change.added.iter().chain(&change.updated).copied();
        inner.render_cursors(&txn, &self.context, clients);
        inner.remove_cursors(&change.removed);
        Ok(())
    }

    /// Run the writes queued while reacting to document changes.
    pub fn flush(&self) -> Result<()> {
        self.ensure_active()?;
        for _ in 0..MAX_FLUSH_ROUNDS {
            let pending = std::mem::take(&mut lock(&self.inner).pending);
            if pending.is_empty() {
                return Ok(());
            }
            let Pending {
                repairs,
                fold_back,
                cursor,
            } = pending;

            if !repairs.is_empty() {
                debug!(repairs = repairs.len(), "applying deferred repairs");
                // Untagged, so this binding's editor sees the repair as well.
                let mut txn = self.doc.transact_mut();
                repairs.apply(&mut txn);
            }

            for change in fold_back {
                debug!(ops = change.ops.len(), "folding implicit editor change into the document");
                let mut inner = lock(&self.inner);
                inner.record_formats(&change);
                let mut txn = self.doc.transact_mut_with(self.context.origin.clone());
                inner.write_change(&mut txn, &self.context, &change);
            }

            if cursor {
                self.publish_cursor();
            }
        }
        warn!(rounds = MAX_FLUSH_ROUNDS, "deferred document writes did not settle");
        Ok(())
    }

    fn publish_cursor(&self) {
        let Some(awareness) = self.context.awareness.as_deref() else {
            return;
        };
        let selection = lock(&self.inner).editor.selection();
        let txn = self.doc.transact();
        let cursor = selection.and_then(|selection| relative_selection(&txn, &self.context.text, selection));
        let published = awareness.local_state().and_then(|state| state.cursor);
        if published != cursor {
            awareness.set_local_cursor(cursor);
        }
        lock(&self.inner).render_all_cursors(&txn, &self.context);
    }

    /// Stop observing the document. The editor keeps its content.
    pub fn destroy(&mut self) {
        if self.subscription.take().is_some() {
            info!(origin = %self.context.token, "binding destroyed");
        }
    }
}

/// Exclusive access to a bound editor.
pub struct EditorGuard<'a, E> {
    guard: MutexGuard<'a, Inner<E>>,
}

impl<E> Deref for EditorGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.guard.editor
    }
}

impl<E> DerefMut for EditorGuard<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.guard.editor
    }
}

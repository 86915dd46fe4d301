//! Presence: per-peer cursors and user metadata shared outside the document.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use yrs::StickyIndex;

mod cursors;

pub use cursors::{CursorDefaults, CursorLayer, CursorRenderer, RenderedCursor, render_peer};

/// Id of a peer in the presence protocol.
pub type ClientId = u64;

/// A selection as a pair of positions that survive concurrent edits.
///
/// Serializes to the JSON form other Yjs clients use for relative positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorState {
    pub anchor: StickyIndex,
    pub head: StickyIndex,
}

/// Metadata a peer shares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl UserInfo {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            color: Some(color.into()),
        }
    }
}

/// Everything one peer publishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// Peers whose state appeared, changed or went away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwarenessChange {
    pub added: Vec<ClientId>,
    pub updated: Vec<ClientId>,
    pub removed: Vec<ClientId>,
}

impl AwarenessChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// The presence collaborator a binding publishes to and reads from.
pub trait Awareness: Send + Sync {
    fn client_id(&self) -> ClientId;

    fn local_state(&self) -> Option<PeerState>;

    /// Replace the cursor field of the local state.
    fn set_local_cursor(&self, cursor: Option<CursorState>);

    /// Current state of every known peer, the local one included.
    fn states(&self) -> HashMap<ClientId, PeerState>;
}

/// In-memory [`Awareness`]. Transport is up to the host, which feeds peer
/// states in through [`LocalAwareness::apply_remote`].
#[derive(Debug)]
pub struct LocalAwareness {
    client_id: ClientId,
    states: RwLock<HashMap<ClientId, PeerState>>,
}

impl LocalAwareness {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_local_user(&self, user: UserInfo) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        states.entry(self.client_id).or_default().user = Some(user);
    }

    /// Store a peer's state, or forget the peer when `state` is `None`.
    pub fn apply_remote(&self, client: ClientId, state: Option<PeerState>) -> AwarenessChange {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        let mut change = AwarenessChange::default();
        match state {
            Some(state) => match states.insert(client, state.clone()) {
                None => change.added.push(client),
                Some(previous) if previous != state => change.updated.push(client),
                Some(_) => {}
            },
            None => {
                if states.remove(&client).is_some() {
                    change.removed.push(client);
                }
            }
        }
        change
    }
}

impl Awareness for LocalAwareness {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn local_state(&self) -> Option<PeerState> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        states.get(&self.client_id).cloned()
    }

    fn set_local_cursor(&self, cursor: Option<CursorState>) {
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        states.entry(self.client_id).or_default().cursor = cursor;
    }

    fn states(&self) -> HashMap<ClientId, PeerState> {
        self.states.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

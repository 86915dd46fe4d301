//! Binding configuration.

use crate::embed::EmbedRegistry;
use crate::presence::CursorDefaults;

/// Options for [`Binding::new`](super::Binding::new).
#[derive(Debug, Clone)]
pub struct BindingOptions {
    /// Embeds stored as structured shared types. Others are kept as values.
    pub embeds: EmbedRegistry,
    pub cursors: CursorDefaults,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            embeds: EmbedRegistry::with_defaults(),
            cursors: CursorDefaults::default(),
        }
    }
}

impl BindingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embeds(mut self, embeds: EmbedRegistry) -> Self {
        self.embeds = embeds;
        self
    }

    pub fn with_cursor_defaults(mut self, cursors: CursorDefaults) -> Self {
        self.cursors = cursors;
        self
    }
}

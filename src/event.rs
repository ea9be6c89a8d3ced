// SPDX-License-Identifier: MPL-2.0
//! Document change notifications.
//!
//! Observers register explicitly and are invoked synchronously after
//! the mutating operation has fully completed; a notification never
//! interleaves with the mutation that caused it.

use crate::layer::LayerId;

/// What changed in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    LayerAdded(LayerId),
    LayerRemoved(LayerId),
    ActiveLayerChanged(Option<LayerId>),
    /// Pixel or structural content changed; a redraw is needed.
    ContentChanged,
    SelectionChanged,
}

/// Registered callback.
pub type Observer = Box<dyn FnMut(&DocumentEvent)>;

/// Handle returned by [`Observers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// Explicit observer registration, replacing implicit global signals.
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    entries: Vec<(ObserverId, Observer)>,
}

impl Observers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    /// Removes an observer; unknown ids are ignored.
    pub fn unsubscribe(&mut self, id: ObserverId) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    /// Delivers an event to every observer, in subscription order.
    pub fn notify(&mut self, event: &DocumentEvent) {
        for (_, observer) in &mut self.entries {
            observer(event);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.entries.len())
            .finish()
    }
}

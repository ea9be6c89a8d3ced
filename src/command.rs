// SPDX-License-Identifier: MPL-2.0
//! Reversible mutation objects.
//!
//! Every document mutation is wrapped in a [`Command`] before it can
//! enter the history. Commands are assumed infallible once built:
//! bounds and index validation happen before construction, and a
//! command whose captured state is absent (an out-of-bounds dirty
//! rectangle, a mask edit on a deleted mask) restores as a no-op
//! rather than an error.
//!
//! Each command reports an estimated byte cost via
//! [`Command::memory_bytes`], which is what the history's eviction
//! policy budgets against.

use crate::document::DocumentState;
use crate::layer::{Layer, LayerId};
use crate::raster::{BlendMode, Mask, PixelBuffer, Rect};

/// Small fixed cost attributed to property commands.
const PROPERTY_OVERHEAD: usize = 64;
/// Small fixed cost attributed to structural commands; the layer's
/// pixels are counted as document content, not history.
const STRUCTURE_OVERHEAD: usize = 128;

/// Which surface of a layer a canvas edit touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Buffer,
    Mask,
}

#[derive(Debug, Clone)]
enum Snapshot {
    Pixels {
        rect: Rect,
        pixels: PixelBuffer,
        /// Captured without a dirty rect; restore replaces the whole
        /// surface so dimension changes round-trip.
        full: bool,
    },
    Coverage {
        rect: Rect,
        coverage: Mask,
        full: bool,
    },
}

impl Snapshot {
    fn memory_bytes(&self) -> usize {
        match self {
            Snapshot::Pixels { pixels, .. } => pixels.byte_len(),
            Snapshot::Coverage { coverage, .. } => coverage.byte_len(),
        }
    }
}

// =============================================================================
// CanvasEdit
// =============================================================================

/// Undoable pixel-level edit against a layer's buffer or mask.
///
/// Captures a before/after pair of `(bounding rect, cropped pixels)`.
/// With no dirty rectangle supplied it captures the full surface, and
/// restoring then replaces the surface outright so edits that change
/// its dimensions round-trip. Dirty-rect captures restore by painting
/// the crop back at its recorded offset with an overwrite copy.
#[derive(Debug, Clone)]
pub struct CanvasEdit {
    layer: LayerId,
    target: EditTarget,
    dirty: Option<Rect>,
    before: Option<Snapshot>,
    after: Option<Snapshot>,
}

impl CanvasEdit {
    /// Builds the edit and captures the "before" state immediately.
    #[must_use]
    pub fn begin(
        state: &DocumentState,
        layer: LayerId,
        target: EditTarget,
        dirty: Option<Rect>,
    ) -> Self {
        let mut edit = Self {
            layer,
            target,
            dirty,
            before: None,
            after: None,
        };
        edit.before = edit.capture(state);
        edit
    }

    #[must_use]
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Narrows the captured region before `capture_after` (a tool may
    /// only know the touched bounds once the gesture ends).
    pub fn set_dirty_rect(&mut self, rect: Rect) {
        self.dirty = Some(rect);
    }

    /// Captures the "after" state once the gesture has finished.
    pub fn capture_after(&mut self, state: &DocumentState) {
        self.after = self.capture(state);
    }

    fn capture(&self, state: &DocumentState) -> Option<Snapshot> {
        let layer = state.layer_by_id(self.layer)?;
        let full = self.dirty.is_none();
        match self.target {
            EditTarget::Buffer => {
                let buffer = layer.buffer();
                let rect = self.dirty.unwrap_or_else(|| buffer.bounds());
                let (rect, pixels) = buffer.crop(&rect)?;
                Some(Snapshot::Pixels { rect, pixels, full })
            }
            EditTarget::Mask => {
                let mask = layer.mask()?;
                let rect = self
                    .dirty
                    .unwrap_or_else(|| Rect::of_size(mask.width(), mask.height()));
                let (rect, coverage) = mask.crop(&rect)?;
                Some(Snapshot::Coverage {
                    rect,
                    coverage,
                    full,
                })
            }
        }
    }

    fn restore(&self, state: &mut DocumentState, snapshot: &Option<Snapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        let Some(layer) = state.layer_by_id_mut(self.layer) else {
            return;
        };
        match snapshot {
            Snapshot::Pixels { rect, pixels, full } => {
                if *full {
                    // The surface may have been resized since capture.
                    *layer.buffer_mut() = pixels.clone();
                } else {
                    layer.buffer_mut().blit(rect.x, rect.y, pixels);
                }
            }
            Snapshot::Coverage {
                rect,
                coverage,
                full,
            } => {
                if *full {
                    layer.set_mask(Some(coverage.clone()));
                } else if let Some(mask) = layer.mask_mut() {
                    mask.blit(rect.x, rect.y, coverage);
                }
            }
        }
    }

    fn execute(&self, state: &mut DocumentState) {
        self.restore(state, &self.after);
    }

    fn undo(&self, state: &mut DocumentState) {
        self.restore(state, &self.before);
    }

    fn memory_bytes(&self) -> usize {
        self.before.as_ref().map_or(0, Snapshot::memory_bytes)
            + self.after.as_ref().map_or(0, Snapshot::memory_bytes)
    }
}

// =============================================================================
// Layer properties
// =============================================================================

/// One changed display property, with old and new values.
#[derive(Debug, Clone)]
pub enum PropertyChange {
    Name { old: String, new: String },
    Visible { old: bool, new: bool },
    Opacity { old: f32, new: f32 },
    BlendMode { old: BlendMode, new: BlendMode },
    /// Mask added, removed, or replaced wholesale.
    Mask {
        old: Option<Mask>,
        new: Option<Mask>,
    },
}

impl PropertyChange {
    fn memory_bytes(&self) -> usize {
        let mask_bytes = |m: &Option<Mask>| m.as_ref().map_or(0, Mask::byte_len);
        match self {
            PropertyChange::Mask { old, new } => {
                PROPERTY_OVERHEAD + mask_bytes(old) + mask_bytes(new)
            }
            _ => PROPERTY_OVERHEAD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayerPropertyEdit {
    layer: LayerId,
    change: PropertyChange,
}

impl LayerPropertyEdit {
    #[must_use]
    pub fn new(layer: LayerId, change: PropertyChange) -> Self {
        Self { layer, change }
    }

    fn apply(&self, state: &mut DocumentState, forward: bool) {
        let Some(layer) = state.layer_by_id_mut(self.layer) else {
            return;
        };
        match &self.change {
            PropertyChange::Name { old, new } => {
                layer.set_name(if forward { new.clone() } else { old.clone() });
            }
            PropertyChange::Visible { old, new } => {
                layer.set_visible(if forward { *new } else { *old });
            }
            PropertyChange::Opacity { old, new } => {
                layer.set_opacity(if forward { *new } else { *old });
            }
            PropertyChange::BlendMode { old, new } => {
                layer.set_blend_mode(if forward { *new } else { *old });
            }
            PropertyChange::Mask { old, new } => {
                layer.set_mask(if forward { new.clone() } else { old.clone() });
            }
        }
    }
}

// =============================================================================
// Layer structure
// =============================================================================

/// Add, remove, or move a layer. Add and remove shuttle the layer's
/// ownership between the command and the document's list, so the
/// pixels are never copied; whichever side currently holds the layer
/// is the one that owns it.
#[derive(Debug, Clone)]
pub enum StructureAction {
    Add {
        index: usize,
        layer: Option<Box<Layer>>,
    },
    Remove {
        index: usize,
        layer: Option<Box<Layer>>,
    },
    Move {
        from: usize,
        to: usize,
    },
}

#[derive(Debug, Clone)]
pub struct LayerStructureEdit {
    action: StructureAction,
}

impl LayerStructureEdit {
    #[must_use]
    pub fn add(index: usize, layer: Layer) -> Self {
        Self {
            action: StructureAction::Add {
                index,
                layer: Some(Box::new(layer)),
            },
        }
    }

    #[must_use]
    pub fn remove(index: usize) -> Self {
        Self {
            action: StructureAction::Remove { index, layer: None },
        }
    }

    #[must_use]
    pub fn shift(from: usize, to: usize) -> Self {
        Self {
            action: StructureAction::Move { from, to },
        }
    }

    fn execute(&mut self, state: &mut DocumentState) {
        match &mut self.action {
            StructureAction::Add { index, layer } => {
                if let Some(layer) = layer.take() {
                    let index = (*index).min(state.layers().len());
                    state.insert_layer(index, *layer);
                    state.set_active_layer(Some(index));
                }
            }
            StructureAction::Remove { index, layer } => {
                if *index < state.layers().len() {
                    *layer = Some(Box::new(state.take_layer(*index)));
                }
            }
            StructureAction::Move { from, to } => {
                if *from < state.layers().len() && *to < state.layers().len() {
                    let layer = state.take_layer(*from);
                    state.insert_layer(*to, layer);
                    state.set_active_layer(Some(*to));
                }
            }
        }
        state.clamp_active_layer();
    }

    fn undo(&mut self, state: &mut DocumentState) {
        match &mut self.action {
            StructureAction::Add { index, layer } => {
                if *index < state.layers().len() {
                    *layer = Some(Box::new(state.take_layer(*index)));
                    state.set_active_layer(index.checked_sub(1).or(Some(0)));
                }
            }
            StructureAction::Remove { index, layer } => {
                if let Some(layer) = layer.take() {
                    let index = (*index).min(state.layers().len());
                    state.insert_layer(index, *layer);
                    state.set_active_layer(Some(index));
                }
            }
            StructureAction::Move { from, to } => {
                if *from < state.layers().len() && *to < state.layers().len() {
                    let layer = state.take_layer(*to);
                    state.insert_layer(*from, layer);
                    state.set_active_layer(Some(*from));
                }
            }
        }
        state.clamp_active_layer();
    }
}

// =============================================================================
// Document properties and selection
// =============================================================================

/// Canvas dimension change.
#[derive(Debug, Clone)]
pub struct DocumentPropertyEdit {
    old_size: (u32, u32),
    new_size: (u32, u32),
}

impl DocumentPropertyEdit {
    #[must_use]
    pub fn resize(old_size: (u32, u32), new_size: (u32, u32)) -> Self {
        Self { old_size, new_size }
    }

    fn apply(&self, state: &mut DocumentState, forward: bool) {
        let (w, h) = if forward { self.new_size } else { self.old_size };
        state.set_size(w, h);
    }
}

/// Selection mask swap; stores both masks whole.
#[derive(Debug, Clone)]
pub struct SelectionEdit {
    old: Mask,
    new: Mask,
}

impl SelectionEdit {
    #[must_use]
    pub fn new(old: Mask, new: Mask) -> Self {
        Self { old, new }
    }

    /// Updates the "after" mask (used by macros that capture the
    /// selection before the surrounding operation runs).
    pub fn set_new_mask(&mut self, mask: Mask) {
        self.new = mask;
    }

    fn apply(&self, state: &mut DocumentState, forward: bool) {
        let mask = if forward { &self.new } else { &self.old };
        state.selection_mut().set_mask(mask.clone());
    }

    fn memory_bytes(&self) -> usize {
        self.old.byte_len() + self.new.byte_len()
    }
}

// =============================================================================
// Command
// =============================================================================

/// A reversible document mutation.
#[derive(Debug, Clone)]
pub enum Command {
    CanvasEdit(CanvasEdit),
    LayerProperty(LayerPropertyEdit),
    LayerStructure(LayerStructureEdit),
    DocumentProperty(DocumentPropertyEdit),
    SelectionEdit(SelectionEdit),
    /// Ordered sub-commands that execute forward and undo in reverse,
    /// making multi-step operations atomic.
    Macro {
        name: String,
        commands: Vec<Command>,
    },
}

impl Command {
    #[must_use]
    pub fn macro_named(name: impl Into<String>) -> Self {
        Command::Macro {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    /// Appends a sub-command. No-op on non-macro commands.
    pub fn push_sub(&mut self, command: Command) {
        if let Command::Macro { commands, .. } = self {
            commands.push(command);
        }
    }

    /// Applies the forward (redo) direction.
    pub fn execute(&mut self, state: &mut DocumentState) {
        match self {
            Command::CanvasEdit(edit) => edit.execute(state),
            Command::LayerProperty(edit) => edit.apply(state, true),
            Command::LayerStructure(edit) => edit.execute(state),
            Command::DocumentProperty(edit) => edit.apply(state, true),
            Command::SelectionEdit(edit) => edit.apply(state, true),
            Command::Macro { commands, .. } => {
                for command in commands.iter_mut() {
                    command.execute(state);
                }
            }
        }
    }

    /// Applies the inverse direction.
    pub fn undo(&mut self, state: &mut DocumentState) {
        match self {
            Command::CanvasEdit(edit) => edit.undo(state),
            Command::LayerProperty(edit) => edit.apply(state, false),
            Command::LayerStructure(edit) => edit.undo(state),
            Command::DocumentProperty(edit) => edit.apply(state, false),
            Command::SelectionEdit(edit) => edit.apply(state, false),
            Command::Macro { commands, .. } => {
                for command in commands.iter_mut().rev() {
                    command.undo(state);
                }
            }
        }
    }

    /// Estimated bytes held by this command's captured state.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        match self {
            Command::CanvasEdit(edit) => edit.memory_bytes(),
            Command::LayerProperty(edit) => edit.change.memory_bytes(),
            Command::LayerStructure(_) => STRUCTURE_OVERHEAD,
            Command::DocumentProperty(_) => PROPERTY_OVERHEAD,
            Command::SelectionEdit(edit) => edit.memory_bytes(),
            Command::Macro { commands, .. } => {
                commands.iter().map(Command::memory_bytes).sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentState;

    fn state_with_layer(width: u32, height: u32) -> (DocumentState, LayerId) {
        let mut state = DocumentState::new(width, height);
        let layer = Layer::new(width, height, "base");
        let id = layer.id();
        state.insert_layer(0, layer);
        state.set_active_layer(Some(0));
        (state, id)
    }

    #[test]
    fn canvas_edit_restores_before_and_after() {
        let (mut state, id) = state_with_layer(8, 8);
        let mut edit = CanvasEdit::begin(&state, id, EditTarget::Buffer, None);

        state
            .layer_by_id_mut(id)
            .unwrap()
            .buffer_mut()
            .set_pixel(3, 3, [10, 20, 30, 255]);
        edit.capture_after(&state);
        let mut command = Command::CanvasEdit(edit);

        command.undo(&mut state);
        assert_eq!(
            state.layer_by_id(id).unwrap().buffer().pixel(3, 3),
            Some([0, 0, 0, 0])
        );
        command.execute(&mut state);
        assert_eq!(
            state.layer_by_id(id).unwrap().buffer().pixel(3, 3),
            Some([10, 20, 30, 255])
        );
    }

    #[test]
    fn canvas_edit_with_dirty_rect_captures_only_region() {
        let (state, id) = state_with_layer(100, 100);
        let edit = CanvasEdit::begin(
            &state,
            id,
            EditTarget::Buffer,
            Some(Rect::new(10, 10, 4, 4)),
        );
        let command = Command::CanvasEdit(edit);
        // Only the before crop exists yet: 4 * 4 * 4 bytes.
        assert_eq!(command.memory_bytes(), 64);
    }

    #[test]
    fn canvas_edit_out_of_bounds_rect_is_noop() {
        let (mut state, id) = state_with_layer(8, 8);
        let mut edit = CanvasEdit::begin(
            &state,
            id,
            EditTarget::Buffer,
            Some(Rect::new(50, 50, 4, 4)),
        );
        edit.capture_after(&state);
        let mut command = Command::CanvasEdit(edit);
        assert_eq!(command.memory_bytes(), 0);
        command.undo(&mut state);
        command.execute(&mut state);
    }

    #[test]
    fn mask_edit_on_maskless_layer_is_noop() {
        let (mut state, id) = state_with_layer(8, 8);
        let mut edit = CanvasEdit::begin(&state, id, EditTarget::Mask, None);
        edit.capture_after(&state);
        let mut command = Command::CanvasEdit(edit);
        assert_eq!(command.memory_bytes(), 0);
        command.undo(&mut state);
    }

    #[test]
    fn property_edit_round_trips_opacity() {
        let (mut state, id) = state_with_layer(4, 4);
        let mut command = Command::LayerProperty(LayerPropertyEdit::new(
            id,
            PropertyChange::Opacity { old: 1.0, new: 0.4 },
        ));
        command.execute(&mut state);
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.4);
        command.undo(&mut state);
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 1.0);
        assert_eq!(command.memory_bytes(), 64);
    }

    #[test]
    fn structure_add_and_undo_shuttle_ownership() {
        let (mut state, _) = state_with_layer(4, 4);
        let extra = Layer::new(4, 4, "extra");
        let extra_id = extra.id();
        let mut command = Command::LayerStructure(LayerStructureEdit::add(1, extra));

        command.execute(&mut state);
        assert_eq!(state.layers().len(), 2);
        assert_eq!(state.layers()[1].id(), extra_id);
        assert_eq!(state.active_layer_index(), Some(1));

        command.undo(&mut state);
        assert_eq!(state.layers().len(), 1);
        assert_eq!(state.active_layer_index(), Some(0));

        // Redo re-inserts the same layer, same id.
        command.execute(&mut state);
        assert_eq!(state.layers()[1].id(), extra_id);
    }

    #[test]
    fn structure_move_round_trips() {
        let (mut state, first) = state_with_layer(4, 4);
        let second = Layer::new(4, 4, "second");
        let second_id = second.id();
        state.insert_layer(1, second);

        let mut command = Command::LayerStructure(LayerStructureEdit::shift(0, 1));
        command.execute(&mut state);
        assert_eq!(state.layers()[0].id(), second_id);
        command.undo(&mut state);
        assert_eq!(state.layers()[0].id(), first);
    }

    #[test]
    fn macro_undoes_in_reverse_order() {
        let (mut state, id) = state_with_layer(4, 4);
        let mut batch = Command::macro_named("batch");
        batch.push_sub(Command::LayerProperty(LayerPropertyEdit::new(
            id,
            PropertyChange::Opacity { old: 1.0, new: 0.5 },
        )));
        batch.push_sub(Command::LayerProperty(LayerPropertyEdit::new(
            id,
            PropertyChange::Opacity { old: 0.5, new: 0.2 },
        )));

        batch.execute(&mut state);
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.2);
        batch.undo(&mut state);
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 1.0);
        assert_eq!(batch.memory_bytes(), 128);
    }

    #[test]
    fn selection_edit_swaps_masks() {
        let (mut state, _) = state_with_layer(10, 10);
        let mut filled = Mask::new(10, 10);
        filled.fill(255);
        let mut command =
            Command::SelectionEdit(SelectionEdit::new(Mask::new(10, 10), filled));

        command.execute(&mut state);
        assert!(state.selection().has_selection());
        command.undo(&mut state);
        assert!(!state.selection().has_selection());
        assert_eq!(command.memory_bytes(), 200);
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Undo history with a byte budget.
//!
//! The timeline holds already-executed commands plus a cursor that
//! splits it into an undo side and a redo side. Pushing a new command
//! discards the redo side, then evicts from the oldest end until the
//! tracked byte total fits the budget, with an entry-count cap as a
//! backstop. The most recent command is never evicted, so a single
//! oversized edit still gets one level of undo.

use std::collections::VecDeque;

use crate::command::Command;
use crate::document::DocumentState;

#[derive(Debug)]
pub struct History {
    commands: VecDeque<Command>,
    /// Number of commands currently applied; commands at
    /// `cursor..` are the redo side.
    cursor: usize,
    cached_bytes: usize,
    memory_limit: usize,
    entry_limit: usize,
}

impl History {
    /// A history budgeted at `memory_limit` bytes and at most
    /// `entry_limit` retained commands.
    #[must_use]
    pub fn new(memory_limit: usize, entry_limit: usize) -> Self {
        Self {
            commands: VecDeque::new(),
            cursor: 0,
            cached_bytes: 0,
            memory_limit,
            entry_limit: entry_limit.max(1),
        }
    }

    /// Records an already-executed command as the newest timeline
    /// entry. Any redo entries are dropped first.
    pub fn push(&mut self, command: Command) {
        while self.commands.len() > self.cursor {
            if let Some(dropped) = self.commands.pop_back() {
                self.cached_bytes -= dropped.memory_bytes();
            }
        }
        self.cached_bytes += command.memory_bytes();
        self.commands.push_back(command);
        self.cursor = self.commands.len();
        self.evict();
    }

    // Oldest-first eviction; never drops below one entry.
    fn evict(&mut self) {
        while self.cached_bytes > self.memory_limit && self.commands.len() > 1 {
            self.evict_oldest();
        }
        while self.commands.len() > self.entry_limit && self.commands.len() > 1 {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(evicted) = self.commands.pop_front() {
            let bytes = evicted.memory_bytes();
            self.cached_bytes -= bytes;
            self.cursor = self.cursor.saturating_sub(1);
            log::debug!(
                "evicted history entry ({bytes} bytes), {} bytes retained",
                self.cached_bytes
            );
        }
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len()
    }

    /// Reverts the newest applied command. Returns whether anything
    /// changed.
    pub fn undo(&mut self, state: &mut DocumentState) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.cursor -= 1;
        if let Some(command) = self.commands.get_mut(self.cursor) {
            command.undo(state);
        }
        true
    }

    /// Re-applies the next undone command. Returns whether anything
    /// changed.
    pub fn redo(&mut self, state: &mut DocumentState) -> bool {
        if !self.can_redo() {
            return false;
        }
        if let Some(command) = self.commands.get_mut(self.cursor) {
            command.execute(state);
        }
        self.cursor += 1;
        true
    }

    /// Undoes until the command at timeline position `index` is the
    /// newest applied one. Only moves backward; an index at or past
    /// the newest applied command is a no-op (use [`History::redo`] to
    /// move forward). Returns whether the cursor moved.
    pub fn goto_index(&mut self, state: &mut DocumentState, index: usize) -> bool {
        if index + 1 >= self.cursor {
            return false;
        }
        while self.cursor > index + 1 {
            self.undo(state);
        }
        true
    }

    /// Number of commands currently applied.
    #[must_use]
    pub fn index(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Tracked bytes across all retained commands, undo and redo side.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.cached_bytes
    }

    #[must_use]
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.cursor = 0;
        self.cached_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{LayerPropertyEdit, PropertyChange, SelectionEdit};
    use crate::layer::{Layer, LayerId};
    use crate::raster::Mask;

    fn state_with_layer() -> (DocumentState, LayerId) {
        let mut state = DocumentState::new(16, 16);
        let layer = Layer::new(16, 16, "base");
        let id = layer.id();
        state.insert_layer(0, layer);
        state.set_active_layer(Some(0));
        (state, id)
    }

    // 64 bytes each.
    fn opacity_command(id: LayerId, old: f32, new: f32) -> Command {
        Command::LayerProperty(LayerPropertyEdit::new(
            id,
            PropertyChange::Opacity { old, new },
        ))
    }

    // 2 * side * side bytes.
    fn selection_command(side: u32) -> Command {
        Command::SelectionEdit(SelectionEdit::new(
            Mask::new(side, side),
            Mask::filled(side, side, 255),
        ))
    }

    #[test]
    fn undo_redo_walk_the_timeline() {
        let (mut state, id) = state_with_layer();
        let mut history = History::new(1 << 20, 100);

        for (old, new) in [(1.0, 0.8), (0.8, 0.5)] {
            let mut cmd = opacity_command(id, old, new);
            cmd.execute(&mut state);
            history.push(cmd);
        }
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.5);

        assert!(history.undo(&mut state));
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.8);
        assert!(history.undo(&mut state));
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 1.0);
        assert!(!history.undo(&mut state));

        assert!(history.redo(&mut state));
        assert!(history.redo(&mut state));
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.5);
        assert!(!history.redo(&mut state));
    }

    #[test]
    fn push_clears_redo_side() {
        let (mut state, id) = state_with_layer();
        let mut history = History::new(1 << 20, 100);

        history.push(opacity_command(id, 1.0, 0.8));
        history.push(opacity_command(id, 0.8, 0.5));
        history.undo(&mut state);
        assert!(history.can_redo());
        assert_eq!(history.memory_usage(), 128);

        history.push(opacity_command(id, 0.8, 0.3));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
        // The discarded redo entry's bytes are released.
        assert_eq!(history.memory_usage(), 128);
    }

    #[test]
    fn byte_budget_evicts_oldest() {
        // Each selection command is 2 * 100 * 100 = 20_000 bytes.
        let mut history = History::new(50_000, 100);
        for _ in 0..3 {
            history.push(selection_command(100));
        }
        // Three entries would be 60_000 bytes; the oldest goes.
        assert_eq!(history.len(), 2);
        assert_eq!(history.memory_usage(), 40_000);
        assert_eq!(history.index(), 2);
    }

    #[test]
    fn single_oversized_entry_is_kept() {
        let mut history = History::new(1_000, 100);
        history.push(selection_command(100));
        assert_eq!(history.len(), 1);
        assert!(history.memory_usage() > history.memory_limit());
        assert!(history.can_undo());
    }

    #[test]
    fn entry_limit_is_a_backstop() {
        let (_, id) = state_with_layer();
        let mut history = History::new(1 << 20, 3);
        for _ in 0..5 {
            history.push(opacity_command(id, 1.0, 0.5));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.memory_usage(), 192);
    }

    #[test]
    fn eviction_preserves_remaining_undo_depth() {
        let (mut state, id) = state_with_layer();
        let mut history = History::new(1 << 20, 2);
        let mut cmd = opacity_command(id, 1.0, 0.8);
        cmd.execute(&mut state);
        history.push(cmd);
        let mut cmd = opacity_command(id, 0.8, 0.5);
        cmd.execute(&mut state);
        history.push(cmd);
        let mut cmd = opacity_command(id, 0.5, 0.2);
        cmd.execute(&mut state);
        history.push(cmd);

        // The oldest command was evicted; two undos remain.
        assert!(history.undo(&mut state));
        assert!(history.undo(&mut state));
        assert!(!history.can_undo());
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.8);
    }

    #[test]
    fn goto_index_only_moves_backward() {
        let (mut state, id) = state_with_layer();
        let mut history = History::new(1 << 20, 100);
        for (old, new) in [(1.0, 0.9), (0.9, 0.6), (0.6, 0.3)] {
            let mut cmd = opacity_command(id, old, new);
            cmd.execute(&mut state);
            history.push(cmd);
        }

        // Position 1 stays applied, so exactly one undo happens.
        assert!(history.goto_index(&mut state, 1));
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.6);
        // Forward jumps are refused; redo is the way forward.
        assert!(!history.goto_index(&mut state, 2));
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.6);
        assert!(history.goto_index(&mut state, 0));
        assert_eq!(state.layer_by_id(id).unwrap().opacity(), 0.9);
        // Jumping to the already-newest position moves nothing.
        assert!(!history.goto_index(&mut state, 0));
        assert!(history.can_redo());
    }

    #[test]
    fn clear_resets_everything() {
        let (_, id) = state_with_layer();
        let mut history = History::new(1 << 20, 100);
        history.push(opacity_command(id, 1.0, 0.5));
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.memory_usage(), 0);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}

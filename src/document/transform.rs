// SPDX-License-Identifier: MPL-2.0
//! Whole-document geometry: resampling, canvas resize, quarter-turn
//! rotation, and mirroring.
//!
//! Each operation snapshots every layer surface and the selection
//! before mutating, then pushes one macro so the whole transform is a
//! single undo step.

use crate::command::{
    CanvasEdit, Command, DocumentPropertyEdit, EditTarget, SelectionEdit,
};
use crate::event::DocumentEvent;
use crate::raster::{Mask, PixelBuffer, Rotation};

use super::{Document, DocumentState};

/// Where existing content sits after a canvas resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasAnchor {
    TopLeft,
    Top,
    TopRight,
    Left,
    #[default]
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl CanvasAnchor {
    /// Offset at which the old content is placed on the new canvas.
    /// Negative offsets crop.
    fn offset(self, old: (u32, u32), new: (u32, u32)) -> (i32, i32) {
        let dw = i64::from(new.0) - i64::from(old.0);
        let dh = i64::from(new.1) - i64::from(old.1);
        let dx = match self {
            CanvasAnchor::TopLeft | CanvasAnchor::Left | CanvasAnchor::BottomLeft => 0,
            CanvasAnchor::Top | CanvasAnchor::Center | CanvasAnchor::Bottom => dw / 2,
            CanvasAnchor::TopRight | CanvasAnchor::Right | CanvasAnchor::BottomRight => dw,
        };
        let dy = match self {
            CanvasAnchor::TopLeft | CanvasAnchor::Top | CanvasAnchor::TopRight => 0,
            CanvasAnchor::Left | CanvasAnchor::Center | CanvasAnchor::Right => dh / 2,
            CanvasAnchor::BottomLeft | CanvasAnchor::Bottom | CanvasAnchor::BottomRight => dh,
        };
        (dx as i32, dy as i32)
    }
}

// Full-surface captures of every layer plus the selection, taken
// before a transform and finalized after it.
struct StackSnapshot {
    edits: Vec<CanvasEdit>,
    selection: SelectionEdit,
}

impl StackSnapshot {
    fn begin(state: &DocumentState) -> Self {
        let mut edits = Vec::new();
        for layer in state.layers() {
            edits.push(CanvasEdit::begin(
                state,
                layer.id(),
                EditTarget::Buffer,
                None,
            ));
            if layer.mask().is_some() {
                edits.push(CanvasEdit::begin(state, layer.id(), EditTarget::Mask, None));
            }
        }
        let mask = state.selection().mask().clone();
        Self {
            edits,
            selection: SelectionEdit::new(mask.clone(), mask),
        }
    }

    fn finish(self, state: &DocumentState) -> Vec<Command> {
        let StackSnapshot {
            edits,
            mut selection,
        } = self;
        let mut commands = Vec::with_capacity(edits.len() + 1);
        for mut edit in edits {
            edit.capture_after(state);
            commands.push(Command::CanvasEdit(edit));
        }
        selection.set_new_mask(state.selection().mask().clone());
        commands.push(Command::SelectionEdit(selection));
        commands
    }
}

impl Document {
    fn finish_transform(&mut self, name: &str, commands: Vec<Command>) {
        self.history.push(Command::Macro {
            name: name.into(),
            commands,
        });
        self.compositor.invalidate_all();
        self.emit(DocumentEvent::ContentChanged);
        self.emit(DocumentEvent::SelectionChanged);
    }

    /// Resamples the whole document to a new size. Every layer buffer,
    /// every layer mask, and the selection are scaled along with the
    /// canvas. One undo step.
    pub fn resize_image(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if width == self.width() && height == self.height() {
            return;
        }
        let snapshot = StackSnapshot::begin(&self.state);
        let mut resize = Command::DocumentProperty(DocumentPropertyEdit::resize(
            (self.width(), self.height()),
            (width, height),
        ));
        resize.execute(&mut self.state);

        for layer in self.state.layers_mut() {
            layer.scale_to(width, height);
        }
        let scaled = self.state.selection().mask().scaled(width, height);
        self.state.selection_mut().set_mask(scaled);

        let mut commands = vec![resize];
        commands.extend(snapshot.finish(&self.state));
        self.finish_transform("Resize Image", commands);
    }

    /// Changes the canvas size without resampling: content is placed
    /// at the anchor position, cropped or padded with transparency.
    pub fn resize_canvas(&mut self, width: u32, height: u32, anchor: CanvasAnchor) {
        if width == 0 || height == 0 {
            return;
        }
        let old = (self.width(), self.height());
        if (width, height) == old {
            return;
        }
        let (dx, dy) = anchor.offset(old, (width, height));

        let snapshot = StackSnapshot::begin(&self.state);
        let mut resize = Command::DocumentProperty(DocumentPropertyEdit::resize(
            old,
            (width, height),
        ));
        resize.execute(&mut self.state);

        for layer in self.state.layers_mut() {
            let mut buffer = PixelBuffer::new(width, height);
            buffer.blit(dx, dy, layer.buffer());
            *layer.buffer_mut() = buffer;
            if let Some(old_mask) = layer.mask() {
                let mut mask = Mask::new(width, height);
                mask.blit(dx, dy, old_mask);
                layer.set_mask(Some(mask));
            }
        }
        let mut mask = Mask::new(width, height);
        mask.blit(dx, dy, self.state.selection().mask());
        self.state.selection_mut().set_mask(mask);

        let mut commands = vec![resize];
        commands.extend(snapshot.finish(&self.state));
        self.finish_transform("Resize Canvas", commands);
    }

    /// Rotates the document by a quarter or half turn. Quarter turns
    /// swap the canvas dimensions.
    pub fn rotate(&mut self, rotation: Rotation) {
        let snapshot = StackSnapshot::begin(&self.state);
        let mut commands = Vec::new();
        if rotation.swaps_dimensions() {
            let old = (self.width(), self.height());
            let mut resize = Command::DocumentProperty(DocumentPropertyEdit::resize(
                old,
                (old.1, old.0),
            ));
            resize.execute(&mut self.state);
            commands.push(resize);
        }

        for layer in self.state.layers_mut() {
            let buffer = layer.buffer().rotated(rotation);
            *layer.buffer_mut() = buffer;
            let mask = layer.mask().map(|m| m.rotated(rotation));
            if mask.is_some() {
                layer.set_mask(mask);
            }
        }
        let rotated = self.state.selection().mask().rotated(rotation);
        self.state.selection_mut().set_mask(rotated);

        commands.extend(snapshot.finish(&self.state));
        self.finish_transform("Rotate Image", commands);
    }

    /// Mirrors the document along the requested axes.
    pub fn flip(&mut self, horizontal: bool, vertical: bool) {
        if !horizontal && !vertical {
            return;
        }
        let snapshot = StackSnapshot::begin(&self.state);

        for layer in self.state.layers_mut() {
            let buffer = layer.buffer().flipped(horizontal, vertical);
            *layer.buffer_mut() = buffer;
            let mask = layer.mask().map(|m| m.flipped(horizontal, vertical));
            if mask.is_some() {
                layer.set_mask(mask);
            }
        }
        let flipped = self
            .state
            .selection()
            .mask()
            .flipped(horizontal, vertical);
        self.state.selection_mut().set_mask(flipped);

        let commands = snapshot.finish(&self.state);
        self.finish_transform("Flip Image", commands);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Rect;
    use crate::selection::SelectionOp;

    #[test]
    fn anchor_offsets_cover_the_grid() {
        let old = (8, 8);
        let new = (12, 10);
        assert_eq!(CanvasAnchor::TopLeft.offset(old, new), (0, 0));
        assert_eq!(CanvasAnchor::Center.offset(old, new), (2, 1));
        assert_eq!(CanvasAnchor::BottomRight.offset(old, new), (4, 2));
        assert_eq!(CanvasAnchor::Top.offset(old, new), (2, 0));
        assert_eq!(CanvasAnchor::Left.offset(old, new), (0, 1));
        // Shrinking crops with a negative offset.
        assert_eq!(CanvasAnchor::Center.offset((8, 8), (4, 8)), (-2, 0));
    }

    #[test]
    fn resize_image_scales_layers_and_undoes_atomically() {
        let mut doc = Document::new(8, 8);
        doc.add_layer("l");
        doc.fill([200, 40, 40, 255]);

        doc.resize_image(4, 4);
        assert_eq!((doc.width(), doc.height()), (4, 4));
        assert_eq!(doc.layers()[0].buffer().width(), 4);
        assert_eq!(doc.layers()[0].buffer().pixel(2, 2), Some([200, 40, 40, 255]));

        assert!(doc.undo());
        assert_eq!((doc.width(), doc.height()), (8, 8));
        assert_eq!(doc.layers()[0].buffer().width(), 8);
        assert_eq!(doc.layers()[0].buffer().pixel(6, 6), Some([200, 40, 40, 255]));
    }

    #[test]
    fn resize_image_scales_layer_masks() {
        let mut doc = Document::new(8, 8);
        doc.add_layer("l");
        doc.add_layer_mask(0);
        doc.resize_image(16, 16);
        assert_eq!(doc.layers()[0].mask().expect("mask").width(), 16);
        doc.undo();
        assert_eq!(doc.layers()[0].mask().expect("mask").width(), 8);
    }

    #[test]
    fn resize_canvas_top_left_preserves_origin_content() {
        let mut doc = Document::new(4, 4);
        doc.add_layer("l");
        doc.fill([10, 20, 30, 255]);

        doc.resize_canvas(6, 6, CanvasAnchor::TopLeft);
        assert_eq!((doc.width(), doc.height()), (6, 6));
        let buffer = doc.layers()[0].buffer();
        assert_eq!(buffer.pixel(0, 0), Some([10, 20, 30, 255]));
        assert_eq!(buffer.pixel(3, 3), Some([10, 20, 30, 255]));
        // Padding is transparent.
        assert_eq!(buffer.pixel(5, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn resize_canvas_bottom_right_shifts_content() {
        let mut doc = Document::new(4, 4);
        doc.add_layer("l");
        doc.fill([10, 20, 30, 255]);

        doc.resize_canvas(6, 6, CanvasAnchor::BottomRight);
        let buffer = doc.layers()[0].buffer();
        assert_eq!(buffer.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(buffer.pixel(2, 2), Some([10, 20, 30, 255]));
        assert_eq!(buffer.pixel(5, 5), Some([10, 20, 30, 255]));
    }

    #[test]
    fn resize_canvas_crop_is_undoable() {
        let mut doc = Document::new(8, 8);
        doc.add_layer("l");
        doc.fill([90, 90, 90, 255]);
        doc.resize_canvas(4, 4, CanvasAnchor::TopLeft);
        assert_eq!(doc.layers()[0].buffer().width(), 4);

        assert!(doc.undo());
        assert_eq!((doc.width(), doc.height()), (8, 8));
        assert_eq!(doc.layers()[0].buffer().pixel(7, 7), Some([90, 90, 90, 255]));
    }

    #[test]
    fn quarter_rotation_swaps_dimensions_and_moves_pixels() {
        let mut doc = Document::new(4, 2);
        doc.add_layer("l");
        doc.layer_mut(0)
            .unwrap()
            .buffer_mut()
            .set_pixel(0, 0, [255, 0, 0, 255]);

        doc.rotate(Rotation::Cw90);
        assert_eq!((doc.width(), doc.height()), (2, 4));
        // Clockwise: (x, y) lands at (h - 1 - y, x).
        assert_eq!(doc.layers()[0].buffer().pixel(1, 0), Some([255, 0, 0, 255]));

        assert!(doc.undo());
        assert_eq!((doc.width(), doc.height()), (4, 2));
        assert_eq!(doc.layers()[0].buffer().pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn half_rotation_keeps_dimensions() {
        let mut doc = Document::new(3, 2);
        doc.add_layer("l");
        doc.layer_mut(0)
            .unwrap()
            .buffer_mut()
            .set_pixel(0, 0, [255, 0, 0, 255]);
        doc.rotate(Rotation::Half);
        assert_eq!((doc.width(), doc.height()), (3, 2));
        assert_eq!(doc.layers()[0].buffer().pixel(2, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn flip_mirrors_content_and_selection() {
        let mut doc = Document::new(4, 4);
        doc.add_layer("l");
        doc.layer_mut(0)
            .unwrap()
            .buffer_mut()
            .set_pixel(0, 0, [255, 0, 0, 255]);
        doc.select_rect(&Rect::new(0, 0, 2, 2), SelectionOp::Replace);

        doc.flip(true, false);
        assert_eq!(doc.layers()[0].buffer().pixel(3, 0), Some([255, 0, 0, 255]));
        assert!(doc.selection().contains(3, 1));
        assert!(!doc.selection().contains(0, 1));

        assert!(doc.undo());
        assert_eq!(doc.layers()[0].buffer().pixel(0, 0), Some([255, 0, 0, 255]));
        assert!(doc.selection().contains(0, 1));
    }

    #[test]
    fn noop_transforms_push_nothing() {
        let mut doc = Document::new(8, 8);
        doc.add_layer("l");
        let baseline = doc.history().len();
        doc.resize_image(8, 8);
        doc.resize_canvas(8, 8, CanvasAnchor::Center);
        doc.resize_image(0, 4);
        doc.flip(false, false);
        assert_eq!(doc.history().len(), baseline);
    }
}

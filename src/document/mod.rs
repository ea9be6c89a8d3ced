// SPDX-License-Identifier: MPL-2.0
//! The document: layer stack, selection, history, compositor, and
//! observers, orchestrated behind one mutation surface.
//!
//! Every public mutation follows the same shape: validate, capture the
//! reversible command, mutate, push the command into the history,
//! invalidate the affected compositor entries, then notify observers.
//! Guard failures (an out-of-range index, deleting the last layer) are
//! silent no-ops; only effect application returns a `Result`, because
//! an effect can fail mid-flight after validation passed.

mod transform;

pub use transform::CanvasAnchor;

use crate::command::{
    CanvasEdit, Command, EditTarget, LayerPropertyEdit, LayerStructureEdit, PropertyChange,
    SelectionEdit,
};
use crate::compositor::Compositor;
use crate::config::Config;
use crate::effect::{EffectConfig, EffectRegistry};
use crate::error::{EffectError, Error, Result};
use crate::event::{DocumentEvent, Observer, ObserverId, Observers};
use crate::history::History;
use crate::layer::{Layer, LayerId};
use crate::raster::{premultiply_channel, BlendMode, Mask, PixelBuffer, Rect};
use crate::selection::{self, SelectionOp, SelectionState};

/// The mutable model a [`Command`] operates on: canvas size, layer
/// stack, active index, and selection. Kept separate from
/// [`Document`] so commands can borrow it mutably while the history
/// that owns them stays untouched.
#[derive(Debug)]
pub struct DocumentState {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    active_layer: Option<usize>,
    selection: SelectionState,
}

impl DocumentState {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
            active_layer: None,
            selection: SelectionState::new(width, height),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[must_use]
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    #[must_use]
    pub fn layer_by_id(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id() == id)
    }

    pub fn layer_by_id_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|layer| layer.id() == id)
    }

    pub(crate) fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub(crate) fn insert_layer(&mut self, index: usize, layer: Layer) {
        self.layers.insert(index.min(self.layers.len()), layer);
    }

    pub(crate) fn take_layer(&mut self, index: usize) -> Layer {
        self.layers.remove(index)
    }

    #[must_use]
    pub fn active_layer_index(&self) -> Option<usize> {
        self.active_layer
    }

    #[must_use]
    pub fn active_layer(&self) -> Option<&Layer> {
        self.active_layer.and_then(|i| self.layers.get(i))
    }

    pub(crate) fn set_active_layer(&mut self, index: Option<usize>) {
        self.active_layer = index;
        self.clamp_active_layer();
    }

    /// Keeps the active index valid after structural changes: clamped
    /// into range, `None` only when the stack is empty.
    pub(crate) fn clamp_active_layer(&mut self) {
        if self.layers.is_empty() {
            self.active_layer = None;
        } else {
            let last = self.layers.len() - 1;
            self.active_layer = Some(self.active_layer.map_or(last, |i| i.min(last)));
        }
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub(crate) fn selection_mut(&mut self) -> &mut SelectionState {
        &mut self.selection
    }
}

/// A layered raster document.
pub struct Document {
    state: DocumentState,
    history: History,
    compositor: Compositor,
    effects: EffectRegistry,
    observers: Observers,
}

impl Document {
    /// A document with the built-in effects and default history
    /// budgets.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_options(
            width,
            height,
            EffectRegistry::with_builtins(),
            &Config::default(),
        )
    }

    /// A document with an injected effect registry and history budgets
    /// taken from `config`.
    #[must_use]
    pub fn with_options(
        width: u32,
        height: u32,
        effects: EffectRegistry,
        config: &Config,
    ) -> Self {
        Self {
            state: DocumentState::new(width, height),
            history: History::new(
                config.history_memory_limit_bytes(),
                config.history_entry_limit(),
            ),
            compositor: Compositor::new(),
            effects,
            observers: Observers::new(),
        }
    }

    // -- accessors ------------------------------------------------------

    #[must_use]
    pub fn width(&self) -> u32 {
        self.state.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.state.height()
    }

    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        self.state.layers()
    }

    #[must_use]
    pub fn layer_by_id(&self, id: LayerId) -> Option<&Layer> {
        self.state.layer_by_id(id)
    }

    #[must_use]
    pub fn active_layer(&self) -> Option<&Layer> {
        self.state.active_layer()
    }

    #[must_use]
    pub fn active_layer_index(&self) -> Option<usize> {
        self.state.active_layer_index()
    }

    /// Mutable layer access for tools painting outside the command
    /// surface. Mutations through this are invisible to the compositor
    /// until [`Document::invalidate_layer`] is called for the layer.
    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.state.layer_mut(index)
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        let index = self.state.active_layer_index()?;
        self.state.layer_mut(index)
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionState {
        self.state.selection()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn effects(&self) -> &EffectRegistry {
        &self.effects
    }

    pub(crate) fn state(&self) -> &DocumentState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut DocumentState {
        &mut self.state
    }

    // -- observers ------------------------------------------------------

    pub fn subscribe(&mut self, observer: Observer) -> ObserverId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) {
        self.observers.unsubscribe(id);
    }

    fn emit(&mut self, event: DocumentEvent) {
        self.observers.notify(&event);
    }

    fn emit_active_layer(&mut self) {
        let id = self.state.active_layer().map(Layer::id);
        self.emit(DocumentEvent::ActiveLayerChanged(id));
    }

    // -- layer structure ------------------------------------------------

    /// Appends a transparent raster layer on top of the stack and
    /// makes it active.
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let layer = Layer::new(self.state.width(), self.state.height(), name);
        let id = layer.id();
        self.push_add_layer(self.state.layers().len(), layer);
        id
    }

    /// Appends an adjustment layer bound to a registered effect.
    /// Unknown effect names are refused before anything mutates.
    pub fn add_adjustment_layer(
        &mut self,
        name: impl Into<String>,
        effect: &str,
        config: EffectConfig,
    ) -> Result<LayerId> {
        if !self.effects.contains(effect) {
            return Err(Error::Effect(EffectError::Unknown(effect.to_owned())));
        }
        let layer = Layer::adjustment(
            self.state.width(),
            self.state.height(),
            name,
            effect,
            config,
        );
        let id = layer.id();
        self.push_add_layer(self.state.layers().len(), layer);
        Ok(id)
    }

    fn push_add_layer(&mut self, index: usize, layer: Layer) {
        let id = layer.id();
        let mut command = Command::LayerStructure(LayerStructureEdit::add(index, layer));
        command.execute(&mut self.state);
        self.history.push(command);
        self.emit(DocumentEvent::LayerAdded(id));
        self.emit_active_layer();
        self.emit(DocumentEvent::ContentChanged);
    }

    /// Removes the layer at `index`. The last remaining layer cannot
    /// be deleted.
    pub fn delete_layer(&mut self, index: usize) {
        if index >= self.state.layers().len() || self.state.layers().len() <= 1 {
            return;
        }
        let id = self.state.layers()[index].id();
        let mut command = Command::LayerStructure(LayerStructureEdit::remove(index));
        command.execute(&mut self.state);
        self.history.push(command);
        self.compositor.invalidate(id);
        self.emit(DocumentEvent::LayerRemoved(id));
        self.emit_active_layer();
        self.emit(DocumentEvent::ContentChanged);
    }

    /// Inserts a copy of the layer at `index` directly above it.
    pub fn duplicate_layer(&mut self, index: usize) -> Option<LayerId> {
        let copy = self.state.layer(index)?.duplicate();
        let id = copy.id();
        self.push_add_layer(index + 1, copy);
        Some(id)
    }

    pub fn move_layer(&mut self, from: usize, to: usize) {
        let len = self.state.layers().len();
        if from == to || from >= len || to >= len {
            return;
        }
        let mut command = Command::LayerStructure(LayerStructureEdit::shift(from, to));
        command.execute(&mut self.state);
        self.history.push(command);
        self.emit_active_layer();
        self.emit(DocumentEvent::ContentChanged);
    }

    pub fn set_active_layer(&mut self, index: usize) {
        if index < self.state.layers().len() {
            self.state.set_active_layer(Some(index));
            self.emit_active_layer();
        }
    }

    /// Composites the layer at `index` into the layer below it with
    /// the top layer's opacity and blend mode, then removes it. One
    /// undo step.
    pub fn merge_layer_down(&mut self, index: usize) {
        if index == 0 || index >= self.state.layers().len() {
            return;
        }
        let top = self.state.layers()[index].clone();
        let bottom_id = self.state.layers()[index - 1].id();

        let mut commands = Vec::new();
        let mut remove = Command::LayerStructure(LayerStructureEdit::remove(index));
        remove.execute(&mut self.state);
        commands.push(remove);

        let mut edit = CanvasEdit::begin(&self.state, bottom_id, EditTarget::Buffer, None);
        if let Some(bottom) = self.state.layer_by_id_mut(bottom_id) {
            let mut source = top.buffer().clone();
            if let Some(mask) = top.mask() {
                crate::raster::apply_mask_coverage(&mut source, mask);
            }
            crate::raster::blend::composite_over(
                bottom.buffer_mut().as_bytes_mut(),
                source.as_bytes(),
                top.opacity(),
                top.blend_mode(),
            );
        }
        edit.capture_after(&self.state);
        commands.push(Command::CanvasEdit(edit));

        self.history.push(Command::Macro {
            name: "Merge Layer Down".into(),
            commands,
        });
        self.compositor.invalidate(top.id());
        self.compositor.invalidate(bottom_id);
        self.emit(DocumentEvent::LayerRemoved(top.id()));
        self.emit_active_layer();
        self.emit(DocumentEvent::ContentChanged);
    }

    /// Replaces the whole stack with a single "Background" layer
    /// holding the composite over white. One undo step.
    pub fn flatten(&mut self) {
        if self.state.layers().is_empty() {
            return;
        }
        let mut flat = PixelBuffer::filled(
            self.state.width(),
            self.state.height(),
            [255, 255, 255, 255],
        );
        let rendered = self.render();
        crate::raster::blend::composite_over(
            flat.as_bytes_mut(),
            rendered.as_bytes(),
            1.0,
            BlendMode::Normal,
        );

        let mut commands = Vec::new();
        let removed: Vec<LayerId> = self.state.layers().iter().map(Layer::id).collect();
        for index in (0..self.state.layers().len()).rev() {
            let mut remove = Command::LayerStructure(LayerStructureEdit::remove(index));
            remove.execute(&mut self.state);
            commands.push(remove);
        }

        let mut layer = Layer::new(self.state.width(), self.state.height(), "Background");
        *layer.buffer_mut() = flat;
        let new_id = layer.id();
        let mut add = Command::LayerStructure(LayerStructureEdit::add(0, layer));
        add.execute(&mut self.state);
        commands.push(add);

        self.history.push(Command::Macro {
            name: "Flatten Image".into(),
            commands,
        });
        self.compositor.invalidate_all();
        for id in removed {
            self.emit(DocumentEvent::LayerRemoved(id));
        }
        self.emit(DocumentEvent::LayerAdded(new_id));
        self.emit_active_layer();
        self.emit(DocumentEvent::ContentChanged);
    }

    // -- layer properties -----------------------------------------------

    fn push_property(&mut self, index: usize, change: PropertyChange, visual: bool) {
        let Some(layer) = self.state.layer(index) else {
            return;
        };
        let id = layer.id();
        let mut command = Command::LayerProperty(LayerPropertyEdit::new(id, change));
        command.execute(&mut self.state);
        self.history.push(command);
        if visual {
            self.compositor.invalidate(id);
            self.emit(DocumentEvent::ContentChanged);
        }
    }

    pub fn set_layer_opacity(&mut self, index: usize, opacity: f32) {
        let Some(layer) = self.state.layer(index) else {
            return;
        };
        let old = layer.opacity();
        let new = opacity.clamp(0.0, 1.0);
        if (old - new).abs() < f32::EPSILON {
            return;
        }
        self.push_property(index, PropertyChange::Opacity { old, new }, true);
    }

    pub fn set_layer_visibility(&mut self, index: usize, visible: bool) {
        let Some(layer) = self.state.layer(index) else {
            return;
        };
        if layer.visible() == visible {
            return;
        }
        self.push_property(
            index,
            PropertyChange::Visible {
                old: layer.visible(),
                new: visible,
            },
            true,
        );
    }

    pub fn rename_layer(&mut self, index: usize, name: impl Into<String>) {
        let Some(layer) = self.state.layer(index) else {
            return;
        };
        let new = name.into();
        if layer.name() == new {
            return;
        }
        self.push_property(
            index,
            PropertyChange::Name {
                old: layer.name().to_owned(),
                new,
            },
            false,
        );
    }

    pub fn set_layer_blend_mode(&mut self, index: usize, mode: BlendMode) {
        let Some(layer) = self.state.layer(index) else {
            return;
        };
        if layer.blend_mode() == mode {
            return;
        }
        self.push_property(
            index,
            PropertyChange::BlendMode {
                old: layer.blend_mode(),
                new: mode,
            },
            true,
        );
    }

    /// Gives the layer a fully opaque mask. No-op when one exists.
    pub fn add_layer_mask(&mut self, index: usize) {
        let Some(layer) = self.state.layer(index) else {
            return;
        };
        if layer.mask().is_some() {
            return;
        }
        let new = Mask::filled(layer.buffer().width(), layer.buffer().height(), 255);
        self.push_property(
            index,
            PropertyChange::Mask {
                old: None,
                new: Some(new),
            },
            true,
        );
    }

    pub fn remove_layer_mask(&mut self, index: usize) {
        let Some(layer) = self.state.layer(index) else {
            return;
        };
        let Some(old) = layer.mask().cloned() else {
            return;
        };
        self.push_property(
            index,
            PropertyChange::Mask {
                old: Some(old),
                new: None,
            },
            true,
        );
    }

    // -- pixel edits ----------------------------------------------------

    /// Starts a reversible edit of the active layer's pixels or mask.
    /// Returns `None` when there is no active layer. Mutate the layer,
    /// then hand the edit back to [`Document::commit_canvas_edit`].
    #[must_use]
    pub fn begin_canvas_edit(
        &self,
        target: EditTarget,
        dirty: Option<Rect>,
    ) -> Option<CanvasEdit> {
        let layer = self.state.active_layer()?;
        Some(CanvasEdit::begin(&self.state, layer.id(), target, dirty))
    }

    /// Finalizes a gesture started with [`Document::begin_canvas_edit`].
    pub fn commit_canvas_edit(&mut self, mut edit: CanvasEdit) {
        edit.capture_after(&self.state);
        let id = edit.layer();
        self.history.push(Command::CanvasEdit(edit));
        self.compositor.invalidate(id);
        self.emit(DocumentEvent::ContentChanged);
    }

    /// Fills the active layer with a straight-alpha color, limited to
    /// the selection when one exists.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        let Some(index) = self.state.active_layer_index() else {
            return;
        };
        let Some(edit) = self.begin_canvas_edit(EditTarget::Buffer, None) else {
            return;
        };
        if self.state.selection().has_selection() {
            let spans = self.state.selection().spans().to_vec();
            let mask = self.state.selection().mask().clone();
            if let Some(layer) = self.state.layer_mut(index) {
                let buffer = layer.buffer_mut();
                for span in spans {
                    for x in span.x0..span.x1 {
                        let coverage = mask.coverage(x, span.y);
                        let a = ((u16::from(rgba[3]) * u16::from(coverage) + 127) / 255) as u8;
                        buffer.set_pixel(
                            x,
                            span.y,
                            [
                                premultiply_channel(rgba[0], a),
                                premultiply_channel(rgba[1], a),
                                premultiply_channel(rgba[2], a),
                                a,
                            ],
                        );
                    }
                }
            }
        } else if let Some(layer) = self.state.layer_mut(index) {
            layer.buffer_mut().fill_rgba(rgba);
        }
        self.commit_canvas_edit(edit);
    }

    /// Runs a registered effect over the active layer's pixels as an
    /// undoable edit. On failure nothing is pushed and the document is
    /// unchanged.
    pub fn apply_effect(&mut self, effect: &str, config: &EffectConfig) -> Result<()> {
        let Some(index) = self.state.active_layer_index() else {
            return Err(Error::Layer("no active layer".into()));
        };
        let effect_impl = self
            .effects
            .get(effect)
            .ok_or_else(|| Error::Effect(EffectError::Unknown(effect.to_owned())))?;

        let layer = self.state.layer(index).ok_or_else(|| {
            Error::Layer(format!("layer index {index} out of range"))
        })?;
        let output = effect_impl.apply(layer.buffer(), config).map_err(|err| {
            log::warn!("effect {effect:?} failed: {err}");
            Error::Effect(err)
        })?;

        let Some(edit) = self.begin_canvas_edit(EditTarget::Buffer, None) else {
            return Err(Error::Layer("no active layer".into()));
        };
        if let Some(layer) = self.state.layer_mut(index) {
            *layer.buffer_mut() = output;
        }
        self.commit_canvas_edit(edit);
        Ok(())
    }

    // -- selection ------------------------------------------------------

    fn push_selection(&mut self, new_mask: Mask) {
        let old = self.state.selection().mask().clone();
        let mut command = Command::SelectionEdit(SelectionEdit::new(old, new_mask));
        command.execute(&mut self.state);
        self.history.push(command);
        self.emit(DocumentEvent::SelectionChanged);
    }

    /// Combines an arbitrary coverage mask into the selection.
    pub fn combine_selection(&mut self, mask: &Mask, op: SelectionOp) {
        let new = selection::combine(self.state.selection().mask(), mask, op);
        self.push_selection(new);
    }

    /// Selects an axis-aligned rectangle.
    pub fn select_rect(&mut self, rect: &Rect, op: SelectionOp) {
        let mask = Mask::from_rect(self.state.width(), self.state.height(), rect);
        self.combine_selection(&mask, op);
    }

    /// Selects the ellipse inscribed in `rect`, anti-aliased.
    pub fn select_ellipse(&mut self, rect: &Rect, op: SelectionOp) {
        let mask = Mask::from_ellipse(self.state.width(), self.state.height(), rect);
        self.combine_selection(&mask, op);
    }

    pub fn select_all(&mut self) {
        let mask = Mask::filled(self.state.width(), self.state.height(), 255);
        self.combine_selection(&mask, SelectionOp::Replace);
    }

    pub fn clear_selection(&mut self) {
        if !self.state.selection().has_selection() {
            return;
        }
        self.push_selection(Mask::new(self.state.width(), self.state.height()));
    }

    pub fn invert_selection(&mut self) {
        let mut mask = self.state.selection().mask().clone();
        mask.invert();
        self.push_selection(mask);
    }

    pub fn feather_selection(&mut self, radius: u32) {
        if !self.state.selection().has_selection() || radius == 0 {
            return;
        }
        let new = selection::feather(self.state.selection().mask(), radius);
        self.push_selection(new);
    }

    pub fn expand_selection(&mut self, amount: u32) {
        if !self.state.selection().has_selection() || amount == 0 {
            return;
        }
        let new = selection::dilate(self.state.selection().mask(), amount);
        self.push_selection(new);
    }

    pub fn contract_selection(&mut self, amount: u32) {
        if !self.state.selection().has_selection() || amount == 0 {
            return;
        }
        let new = selection::erode(self.state.selection().mask(), amount);
        self.push_selection(new);
    }

    // -- rendering ------------------------------------------------------

    /// Composites the visible layers into a premultiplied buffer.
    pub fn render(&mut self) -> PixelBuffer {
        self.compositor.render(
            self.state.width(),
            self.state.height(),
            &self.state.layers,
            &self.effects,
        )
    }

    /// Drops the cached composite source for one layer. Callers that
    /// mutate layer pixels outside the command surface must call this
    /// or renders keep the old pixels.
    pub fn invalidate_layer(&mut self, id: LayerId) {
        self.compositor.invalidate(id);
    }

    // -- history --------------------------------------------------------

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let changed = self.history.undo(&mut self.state);
        if changed {
            self.after_history_jump();
        }
        changed
    }

    pub fn redo(&mut self) -> bool {
        let changed = self.history.redo(&mut self.state);
        if changed {
            self.after_history_jump();
        }
        changed
    }

    /// Rewinds to an earlier history index (see [`History::goto_index`]).
    pub fn goto_history_index(&mut self, index: usize) -> bool {
        let changed = self.history.goto_index(&mut self.state, index);
        if changed {
            self.after_history_jump();
        }
        changed
    }

    // A history jump can touch anything, so every cache goes.
    fn after_history_jump(&mut self) {
        self.state.clamp_active_layer();
        self.compositor.invalidate_all();
        self.emit(DocumentEvent::ContentChanged);
        self.emit(DocumentEvent::SelectionChanged);
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("width", &self.state.width())
            .field("height", &self.state.height())
            .field("layers", &self.state.layers().len())
            .field("history_len", &self.history.len())
            .finish()
    }
}

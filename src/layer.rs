// SPDX-License-Identifier: MPL-2.0
//! Layers: a pixel surface plus display properties, an optional
//! coverage mask, and an optional adjustment-effect binding.

use crate::effect::EffectConfig;
use crate::raster::{BlendMode, Mask, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque layer identity, unique within a process and immutable for
/// the lifetime of the layer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LayerId(u64);

impl LayerId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Rebuilds an id from persisted state and keeps the allocator
    /// ahead of it so rehydrated ids stay unique.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        NEXT_LAYER_ID.fetch_max(raw + 1, Ordering::Relaxed);
        Self(raw)
    }
}

/// What a layer contributes to compositing.
///
/// An adjustment layer's own buffer exists but is ignored by the
/// compositor; the layer is a carrier for an effect that transforms
/// the accumulated output beneath it. The variant tag makes that
/// special path explicit instead of hiding it behind a boolean.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Ordinary pixel content.
    Raster,
    /// Applies the named registered effect to everything below.
    Adjustment {
        effect: String,
        config: EffectConfig,
    },
}

impl LayerKind {
    #[must_use]
    pub fn is_adjustment(&self) -> bool {
        matches!(self, LayerKind::Adjustment { .. })
    }
}

/// One layer of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    id: LayerId,
    name: String,
    visible: bool,
    opacity: f32,
    blend_mode: BlendMode,
    buffer: PixelBuffer,
    mask: Option<Mask>,
    kind: LayerKind,
}

impl Layer {
    /// Creates a transparent raster layer.
    #[must_use]
    pub fn new(width: u32, height: u32, name: impl Into<String>) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            buffer: PixelBuffer::new(width, height),
            mask: None,
            kind: LayerKind::Raster,
        }
    }

    /// Creates an adjustment layer bound to a registered effect.
    #[must_use]
    pub fn adjustment(
        width: u32,
        height: u32,
        name: impl Into<String>,
        effect: impl Into<String>,
        config: EffectConfig,
    ) -> Self {
        let mut layer = Self::new(width, height, name);
        layer.kind = LayerKind::Adjustment {
            effect: effect.into(),
            config,
        };
        layer
    }

    pub(crate) fn with_id(mut self, id: LayerId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Sets layer opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    #[must_use]
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Mutable access for tools painting into the layer.
    ///
    /// Callers that mutate through this must invalidate the
    /// compositor's cache entry for this layer, or renders stay stale.
    pub fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    #[must_use]
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn mask_mut(&mut self) -> Option<&mut Mask> {
        self.mask.as_mut()
    }

    pub fn set_mask(&mut self, mask: Option<Mask>) {
        self.mask = mask;
    }

    /// Adds a fully opaque mask if the layer does not have one yet.
    pub fn create_mask(&mut self) {
        if self.mask.is_none() {
            self.mask = Some(Mask::filled(
                self.buffer.width(),
                self.buffer.height(),
                255,
            ));
        }
    }

    pub fn delete_mask(&mut self) {
        self.mask = None;
    }

    #[must_use]
    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// A copy with a fresh id, for duplicate-layer operations.
    #[must_use]
    pub fn duplicate(&self) -> Layer {
        let mut copy = self.clone();
        copy.id = LayerId::next();
        copy.name = format!("{} Copy", self.name);
        copy
    }

    /// Replaces the buffer with a scaled copy (and scales the mask
    /// alongside it).
    pub fn scale_to(&mut self, width: u32, height: u32) {
        self.buffer = self.buffer.scaled(width, height);
        if let Some(mask) = &self.mask {
            self.mask = Some(mask.scaled(width, height));
        }
    }
}

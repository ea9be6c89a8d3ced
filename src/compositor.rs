// SPDX-License-Identifier: MPL-2.0
//! Layer compositing with a per-layer source cache.
//!
//! The compositor folds layers bottom-to-top into one premultiplied
//! output buffer. For each raster layer it caches the layer's source
//! surface; when the layer carries a mask, the masked copy is derived
//! fresh on every render and never cached, so mask edits show up on
//! the next render on their own.
//!
//! Invalidation is push-based: callers that mutate a layer's pixels
//! must call [`Compositor::invalidate`] for that layer, or the render
//! keeps serving the cached copy. That staleness is the contract, not
//! a bug; the document front-end owns invalidation and the compositor
//! never diffs pixels to find changes.

use std::collections::HashMap;

use crate::effect::EffectRegistry;
use crate::layer::{Layer, LayerId, LayerKind};
use crate::raster::{apply_mask_coverage, blend, Mask, PixelBuffer};

#[derive(Debug, Default)]
pub struct Compositor {
    cache: HashMap<LayerId, PixelBuffer>,
}

impl Compositor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the cached source for one layer.
    pub fn invalidate(&mut self, layer: LayerId) {
        if self.cache.remove(&layer).is_some() {
            log::trace!("invalidated cache for layer {}", layer.raw());
        }
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cached_layers(&self) -> usize {
        self.cache.len()
    }

    /// Composites `layers` bottom-to-top into a fresh transparent
    /// buffer of the given size.
    ///
    /// Invisible and fully transparent layers are skipped. Adjustment
    /// layers transform the accumulated output instead of contributing
    /// pixels; a missing or failing effect leaves the output untouched
    /// and logs a warning.
    pub fn render(
        &mut self,
        width: u32,
        height: u32,
        layers: &[Layer],
        effects: &EffectRegistry,
    ) -> PixelBuffer {
        let mut output = PixelBuffer::new(width, height);
        for layer in layers {
            if !layer.visible() || layer.opacity() <= 0.0 {
                continue;
            }
            match layer.kind() {
                LayerKind::Adjustment { effect, config } => {
                    let Some(effect_impl) = effects.get(effect) else {
                        log::warn!("adjustment layer references unknown effect {effect:?}");
                        continue;
                    };
                    match effect_impl.apply(&output, config) {
                        Ok(adjusted) => {
                            mix_adjusted(&mut output, &adjusted, layer.opacity(), layer.mask());
                        }
                        Err(err) => {
                            log::warn!("adjustment effect {effect:?} failed: {err}");
                        }
                    }
                }
                LayerKind::Raster => {
                    self.ensure_cached(layer);
                    let source = &self.cache[&layer.id()];
                    if source.width() == width && source.height() == height {
                        let masked = layer.mask().map(|mask| {
                            let mut masked = source.clone();
                            apply_mask_coverage(&mut masked, mask);
                            masked
                        });
                        blend::composite_over(
                            output.as_bytes_mut(),
                            masked.as_ref().unwrap_or(source).as_bytes(),
                            layer.opacity(),
                            layer.blend_mode(),
                        );
                    } else {
                        log::warn!(
                            "layer {} is {}x{}, expected {width}x{height}; skipping",
                            layer.id().raw(),
                            source.width(),
                            source.height()
                        );
                    }
                }
            }
        }
        output
    }

    fn ensure_cached(&mut self, layer: &Layer) {
        if self.cache.contains_key(&layer.id()) {
            return;
        }
        log::trace!("caching source for layer {}", layer.id().raw());
        self.cache.insert(layer.id(), layer.buffer().clone());
    }
}

// Linear blend of two premultiplied buffers, weighted by opacity and
// an optional per-pixel mask. Used to fade adjustment layers in.
fn mix_adjusted(dst: &mut PixelBuffer, src: &PixelBuffer, opacity: f32, mask: Option<&Mask>) {
    let width = dst.width();
    for (i, (d, s)) in dst
        .as_bytes_mut()
        .chunks_exact_mut(4)
        .zip(src.as_bytes().chunks_exact(4))
        .enumerate()
    {
        let mut t = opacity;
        if let Some(mask) = mask {
            let x = (i as u32) % width;
            let y = (i as u32) / width;
            t *= f32::from(mask.coverage(x, y)) / 255.0;
        }
        if t <= 0.0 {
            continue;
        }
        for c in 0..4 {
            let mixed = f32::from(d[c]) * (1.0 - t) + f32::from(s[c]) * t;
            d[c] = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Selection engine.
//!
//! The selection is a single-channel image, not a vector shape: one
//! [`Mask`] expresses per-pixel membership, and everything else
//! (boolean combination, feathering, morphological grow/shrink) is
//! image processing over that mask.

use crate::raster::Mask;
use image_rs::imageops;

/// How an incoming shape mask combines with the existing selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOp {
    /// Discard the old selection entirely.
    Replace,
    /// Union (over-compositing of opaque coverage).
    Add,
    /// Clear wherever the incoming mask is opaque.
    Subtract,
    /// Keep only where both masks are opaque.
    Intersect,
}

/// A horizontal run of selected pixels; `x1` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub y: u32,
    pub x0: u32,
    pub x1: u32,
}

#[inline]
fn mul_div255(a: u16, b: u16) -> u8 {
    ((a * b + 127) / 255) as u8
}

/// Combines two selection masks with a boolean operation, producing a
/// brand-new mask sized like `current`.
#[must_use]
pub fn combine(current: &Mask, incoming: &Mask, op: SelectionOp) -> Mask {
    let mut out = match op {
        SelectionOp::Replace => Mask::new(current.width(), current.height()),
        _ => current.clone(),
    };
    let w = out.width().min(incoming.width());
    let h = out.height().min(incoming.height());
    for y in 0..h {
        for x in 0..w {
            let s = incoming.coverage(x, y);
            let d = out.coverage(x, y);
            let v = match op {
                SelectionOp::Replace => s,
                // Source-over of coverage: s + d * (1 - s)
                SelectionOp::Add => s.saturating_add(mul_div255(u16::from(d), 255 - u16::from(s))),
                // Destination-out: d * (1 - s)
                SelectionOp::Subtract => mul_div255(u16::from(d), 255 - u16::from(s)),
                // Destination-in: d * s
                SelectionOp::Intersect => mul_div255(u16::from(d), u16::from(s)),
            };
            out.set_coverage(x, y, v);
        }
    }
    out
}

// Offsets of the circular structuring element, dx*dx + dy*dy <= r*r.
fn disc_offsets(radius: u32) -> Vec<(i64, i64)> {
    let r = i64::from(radius);
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Morphological dilation: a pixel becomes selected when any pixel
/// within the circular radius is selected (maximum filter).
#[must_use]
pub fn dilate(mask: &Mask, radius: u32) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    let offsets = disc_offsets(radius);
    morph(mask, &offsets, 0, |acc, v| acc.max(v))
}

/// Morphological erosion: a pixel stays selected only when every pixel
/// within the circular radius is selected (minimum filter). Pixels
/// outside the mask count as unselected, so the selection also
/// contracts away from the borders.
#[must_use]
pub fn erode(mask: &Mask, radius: u32) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    let offsets = disc_offsets(radius);
    morph(mask, &offsets, 255, |acc, v| acc.min(v))
}

fn morph<F>(mask: &Mask, offsets: &[(i64, i64)], init: u8, fold: F) -> Mask
where
    F: Fn(u8, u8) -> u8,
{
    let (w, h) = (mask.width(), mask.height());
    let mut out = Mask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = init;
            for &(dx, dy) in offsets {
                let sx = i64::from(x) + dx;
                let sy = i64::from(y) + dy;
                let v = if sx < 0 || sy < 0 || sx >= i64::from(w) || sy >= i64::from(h) {
                    0
                } else {
                    mask.coverage(sx as u32, sy as u32)
                };
                acc = fold(acc, v);
            }
            out.set_coverage(x, y, acc);
        }
    }
    out
}

/// Softens selection edges with a Gaussian blur (sigma = radius / 3).
#[must_use]
pub fn feather(mask: &Mask, radius: u32) -> Mask {
    if radius == 0 {
        return mask.clone();
    }
    let sigma = radius as f32 / 3.0;
    let blurred = imageops::blur(&mask.to_gray_image(), sigma);
    Mask::from_gray_image(&blurred)
}

/// Horizontal spans of selected pixels, thresholding intensity > 0.
#[must_use]
pub fn spans_of(mask: &Mask) -> Vec<Span> {
    let mut spans = Vec::new();
    for y in 0..mask.height() {
        let mut run_start: Option<u32> = None;
        for x in 0..mask.width() {
            let selected = mask.coverage(x, y) > 0;
            match (selected, run_start) {
                (true, None) => run_start = Some(x),
                (false, Some(x0)) => {
                    spans.push(Span { y, x0, x1: x });
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(x0) = run_start {
            spans.push(Span {
                y,
                x0,
                x1: mask.width(),
            });
        }
    }
    spans
}

/// The document's selection: the mask plus the region state derived
/// from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionState {
    mask: Mask,
    has_selection: bool,
    spans: Vec<Span>,
}

impl SelectionState {
    /// An empty selection covering a `width x height` canvas.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: Mask::new(width, height),
            has_selection: false,
            spans: Vec::new(),
        }
    }

    #[must_use]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    #[must_use]
    pub fn has_selection(&self) -> bool {
        self.has_selection
    }

    /// The traversable region as horizontal spans, top to bottom.
    #[must_use]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Whether a pixel is part of the selected region (any positive
    /// intensity counts).
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.mask.coverage(x, y) > 0
    }

    /// Replaces the mask and recomputes the derived region state.
    pub fn set_mask(&mut self, mask: Mask) {
        self.spans = spans_of(&mask);
        self.has_selection = !self.spans.is_empty();
        self.mask = mask;
    }
}

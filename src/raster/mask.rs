// SPDX-License-Identifier: MPL-2.0
//! Single-channel coverage masks.
//!
//! A [`Mask`] stores one byte per pixel: 0 is fully unselected (or
//! transparent when used as a layer opacity mask), 255 fully selected
//! (opaque). The same type backs both layer masks and the document's
//! selection mask.

use super::Rect;
use image_rs::imageops::{self, FilterType};
use image_rs::GrayImage;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Transform};

/// A `width x height x 1` byte coverage buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// Creates a fully unselected (zero) mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    /// Creates a mask filled with a uniform coverage value.
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Wraps raw coverage bytes. Returns `None` when the length does
    /// not match the dimensions.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Rasterizes an axis-aligned rectangle into a mask of the given size.
    #[must_use]
    pub fn from_rect(width: u32, height: u32, rect: &Rect) -> Self {
        Self::rasterize(width, height, || {
            let r = tiny_skia::Rect::from_xywh(
                rect.x as f32,
                rect.y as f32,
                rect.width as f32,
                rect.height as f32,
            )?;
            Some(PathBuilder::from_rect(r))
        })
    }

    /// Rasterizes an anti-aliased ellipse inscribed in `rect`.
    #[must_use]
    pub fn from_ellipse(width: u32, height: u32, rect: &Rect) -> Self {
        Self::rasterize(width, height, || {
            let r = tiny_skia::Rect::from_xywh(
                rect.x as f32,
                rect.y as f32,
                rect.width as f32,
                rect.height as f32,
            )?;
            let mut pb = PathBuilder::new();
            pb.push_oval(r);
            pb.finish()
        })
    }

    // Shared tiny-skia fill: build a path, fill it white, keep the
    // alpha channel as coverage. Degenerate shapes yield an empty mask.
    fn rasterize<F>(width: u32, height: u32, build: F) -> Self
    where
        F: FnOnce() -> Option<tiny_skia::Path>,
    {
        let Some(mut pixmap) = Pixmap::new(width, height) else {
            return Self::new(width, height);
        };
        let Some(path) = build() else {
            return Self::new(width, height);
        };
        let mut paint = Paint::default();
        paint.set_color(Color::WHITE);
        paint.anti_alias = true;
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        let data = pixmap.pixels().iter().map(|px| px.alpha()).collect();
        Self {
            width,
            height,
            data,
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

    /// Size of the coverage data in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Coverage at one pixel; out-of-bounds reads are fully unselected.
    #[must_use]
    pub fn coverage(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set_coverage(&mut self, x: u32, y: u32, value: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Inverts coverage in place (0 <-> 255).
    pub fn invert(&mut self) {
        for v in &mut self.data {
            *v = 255 - *v;
        }
    }

    /// True when no pixel has positive coverage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Copies out the given region, clamped to the mask bounds.
    #[must_use]
    pub fn crop(&self, rect: &Rect) -> Option<(Rect, Mask)> {
        let rect = rect.clamped_to(self.width, self.height)?;
        let mut out = Mask::new(rect.width, rect.height);
        let src_w = self.width as usize;
        let row_bytes = rect.width as usize;
        for row in 0..rect.height as usize {
            let src_start = (rect.y as usize + row) * src_w + rect.x as usize;
            let dst_start = row * row_bytes;
            out.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&self.data[src_start..src_start + row_bytes]);
        }
        Some((rect, out))
    }

    /// Pastes `src` at the given offset, overwriting coverage, clipped
    /// to the mask bounds.
    pub fn blit(&mut self, x: i32, y: i32, src: &Mask) {
        let target = Rect::new(x, y, src.width, src.height);
        let Some(clipped) = target.clamped_to(self.width, self.height) else {
            return;
        };
        let dst_w = self.width as usize;
        let src_w = src.width as usize;
        let row_bytes = clipped.width as usize;
        for row in 0..clipped.height as usize {
            let dst_start = (clipped.y as usize + row) * dst_w + clipped.x as usize;
            let src_start = ((clipped.y - y) as usize + row) * src_w + (clipped.x - x) as usize;
            self.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src.data[src_start..src_start + row_bytes]);
        }
    }

    /// Nearest-neighbor rescale (masks keep hard edges under resize).
    #[must_use]
    pub fn scaled(&self, width: u32, height: u32) -> Mask {
        let img = self.to_gray_image();
        let resized = imageops::resize(&img, width.max(1), height.max(1), FilterType::Nearest);
        Mask {
            width: resized.width(),
            height: resized.height(),
            data: resized.into_raw(),
        }
    }

    #[must_use]
    pub fn rotated(&self, rotation: super::Rotation) -> Mask {
        let img = self.to_gray_image();
        let rotated = match rotation {
            super::Rotation::Cw90 => imageops::rotate90(&img),
            super::Rotation::Ccw90 => imageops::rotate270(&img),
            super::Rotation::Half => imageops::rotate180(&img),
        };
        Mask {
            width: rotated.width(),
            height: rotated.height(),
            data: rotated.into_raw(),
        }
    }

    #[must_use]
    pub fn flipped(&self, horizontal: bool, vertical: bool) -> Mask {
        let mut img = self.to_gray_image();
        if horizontal {
            img = imageops::flip_horizontal(&img);
        }
        if vertical {
            img = imageops::flip_vertical(&img);
        }
        Mask {
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
        }
    }

    pub(crate) fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    pub(crate) fn from_gray_image(image: &GrayImage) -> Mask {
        Mask {
            width: image.width(),
            height: image.height(),
            data: image.as_raw().clone(),
        }
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Premultiplied RGBA pixel surfaces.
//!
//! A [`PixelBuffer`] is a fixed-size, row-major, 4-channel buffer with
//! premultiplied alpha: every color channel is already scaled by the
//! alpha channel, so `color <= alpha` holds per channel. Compositing
//! math stays simple at the cost of a conversion step whenever pixels
//! cross the boundary to straight-alpha formats (PNG files, effects
//! that do plain RGB arithmetic).

use super::Rect;
use image_rs::imageops::{self, FilterType};
use image_rs::RgbaImage;

/// Quarter-turn rotations supported by document transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// 90 degrees clockwise.
    Cw90,
    /// 90 degrees counter-clockwise.
    Ccw90,
    /// 180 degrees.
    Half,
}

impl Rotation {
    /// Whether this rotation swaps width and height.
    #[must_use]
    pub fn swaps_dimensions(self) -> bool {
        !matches!(self, Rotation::Half)
    }
}

/// Premultiplies one straight-alpha channel value.
#[inline]
#[must_use]
pub fn premultiply_channel(color: u8, alpha: u8) -> u8 {
    ((u16::from(color) * u16::from(alpha) + 127) / 255) as u8
}

/// Undoes premultiplication for one channel value.
#[inline]
#[must_use]
pub fn unpremultiply_channel(color: u8, alpha: u8) -> u8 {
    if alpha == 0 {
        return 0;
    }
    let v = (u32::from(color) * 255 + u32::from(alpha) / 2) / u32::from(alpha);
    v.min(255) as u8
}

/// A `width x height x 4` byte surface, premultiplied RGBA, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Creates a fully transparent buffer.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Creates a buffer filled with a straight-alpha RGBA color.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut buffer = Self::new(width, height);
        buffer.fill_rgba(rgba);
        buffer
    }

    /// Wraps raw premultiplied bytes. Returns `None` when the length
    /// does not match the dimensions.
    #[must_use]
    pub fn from_premultiplied(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }

    /// Size of the pixel data in bytes.
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

    /// Premultiplied RGBA of one pixel, or `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Writes one premultiplied pixel. Out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba_premul: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba_premul);
    }

    /// Fills the whole buffer with a straight-alpha color.
    pub fn fill_rgba(&mut self, rgba: [u8; 4]) {
        let a = rgba[3];
        let px = [
            premultiply_channel(rgba[0], a),
            premultiply_channel(rgba[1], a),
            premultiply_channel(rgba[2], a),
            a,
        ];
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Clears the buffer to fully transparent.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Copies out the given region, clamped to the buffer bounds.
    ///
    /// Returns the clamped rectangle together with the cropped pixels,
    /// or `None` when the rectangle lies entirely outside the buffer.
    #[must_use]
    pub fn crop(&self, rect: &Rect) -> Option<(Rect, PixelBuffer)> {
        let rect = rect.clamped_to(self.width, self.height)?;
        let mut out = PixelBuffer::new(rect.width, rect.height);
        let src_w = self.width as usize;
        let row_bytes = rect.width as usize * 4;
        for row in 0..rect.height as usize {
            let sy = rect.y as usize + row;
            let sx = rect.x as usize;
            let src_start = (sy * src_w + sx) * 4;
            let dst_start = row * row_bytes;
            out.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&self.data[src_start..src_start + row_bytes]);
        }
        Some((rect, out))
    }

    /// Paints `src` at the given offset, overwriting destination pixels
    /// (no blending). The copy is clipped to the buffer bounds.
    pub fn blit(&mut self, x: i32, y: i32, src: &PixelBuffer) {
        let target = Rect::new(x, y, src.width, src.height);
        let Some(clipped) = target.clamped_to(self.width, self.height) else {
            return;
        };
        let dst_w = self.width as usize;
        let src_w = src.width as usize;
        let row_bytes = clipped.width as usize * 4;
        for row in 0..clipped.height as usize {
            let dy = clipped.y as usize + row;
            let dx = clipped.x as usize;
            let sy = (clipped.y - y) as usize + row;
            let sx = (clipped.x - x) as usize;
            let dst_start = (dy * dst_w + dx) * 4;
            let src_start = (sy * src_w + sx) * 4;
            self.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&src.data[src_start..src_start + row_bytes]);
        }
    }

    /// Scales the buffer to new dimensions with bilinear filtering.
    ///
    /// Bilinear output is a convex combination of input pixels, which
    /// keeps the premultiplication invariant intact (no overshoot).
    #[must_use]
    pub fn scaled(&self, width: u32, height: u32) -> PixelBuffer {
        let img = self.to_rgba_image_raw();
        let resized = imageops::resize(&img, width.max(1), height.max(1), FilterType::Triangle);
        PixelBuffer {
            width: resized.width(),
            height: resized.height(),
            data: resized.into_raw(),
        }
    }

    /// Quarter-turn or half-turn rotation; 90-degree turns swap dimensions.
    #[must_use]
    pub fn rotated(&self, rotation: Rotation) -> PixelBuffer {
        let img = self.to_rgba_image_raw();
        let rotated = match rotation {
            Rotation::Cw90 => imageops::rotate90(&img),
            Rotation::Ccw90 => imageops::rotate270(&img),
            Rotation::Half => imageops::rotate180(&img),
        };
        PixelBuffer {
            width: rotated.width(),
            height: rotated.height(),
            data: rotated.into_raw(),
        }
    }

    /// Mirrors the buffer along the requested axes.
    #[must_use]
    pub fn flipped(&self, horizontal: bool, vertical: bool) -> PixelBuffer {
        let mut img = self.to_rgba_image_raw();
        if horizontal {
            img = imageops::flip_horizontal(&img);
        }
        if vertical {
            img = imageops::flip_vertical(&img);
        }
        PixelBuffer {
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
        }
    }

    /// Converts to a straight-alpha [`RgbaImage`] (for PNG encoding and
    /// effects doing plain RGB math).
    #[must_use]
    pub fn to_straight_rgba(&self) -> RgbaImage {
        let mut out = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(4) {
            let a = px[3];
            out.push(unpremultiply_channel(px[0], a));
            out.push(unpremultiply_channel(px[1], a));
            out.push(unpremultiply_channel(px[2], a));
            out.push(a);
        }
        RgbaImage::from_raw(self.width, self.height, out)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Builds a buffer from a straight-alpha image, premultiplying.
    #[must_use]
    pub fn from_straight_rgba(image: &RgbaImage) -> PixelBuffer {
        let mut data = Vec::with_capacity(image.as_raw().len());
        for px in image.as_raw().chunks_exact(4) {
            let a = px[3];
            data.push(premultiply_channel(px[0], a));
            data.push(premultiply_channel(px[1], a));
            data.push(premultiply_channel(px[2], a));
            data.push(a);
        }
        PixelBuffer {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    // Raw reinterpretation as an RgbaImage; the bytes stay premultiplied.
    // Only valid for operations that are linear in the pixel values
    // (scaling, rotation, mirroring).
    fn to_rgba_image_raw(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_transparent() {
        let buf = PixelBuffer::new(4, 4);
        assert_eq!(buf.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(buf.byte_len(), 64);
    }

    #[test]
    fn fill_premultiplies_color() {
        let buf = PixelBuffer::filled(2, 2, [255, 0, 0, 128]);
        let px = buf.pixel(1, 1).expect("in bounds");
        // 255 * 128/255 rounds to 128.
        assert_eq!(px, [128, 0, 0, 128]);
        assert!(px[0] <= px[3]);
    }

    #[test]
    fn crop_and_blit_round_trip() {
        let mut buf = PixelBuffer::new(10, 10);
        buf.set_pixel(5, 5, [100, 100, 100, 255]);
        let (rect, patch) = buf.crop(&Rect::new(4, 4, 3, 3)).expect("overlap");
        assert_eq!(rect, Rect::new(4, 4, 3, 3));
        assert_eq!(patch.pixel(1, 1), Some([100, 100, 100, 255]));

        let mut restored = PixelBuffer::new(10, 10);
        restored.blit(rect.x, rect.y, &patch);
        assert_eq!(restored.pixel(5, 5), Some([100, 100, 100, 255]));
        assert_eq!(restored.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn crop_clamps_to_bounds() {
        let buf = PixelBuffer::filled(8, 8, [0, 255, 0, 255]);
        let (rect, patch) = buf.crop(&Rect::new(6, 6, 10, 10)).expect("overlap");
        assert_eq!(rect, Rect::new(6, 6, 2, 2));
        assert_eq!(patch.width(), 2);
        assert_eq!(patch.height(), 2);
    }

    #[test]
    fn crop_outside_bounds_is_none() {
        let buf = PixelBuffer::new(8, 8);
        assert!(buf.crop(&Rect::new(20, 20, 4, 4)).is_none());
    }

    #[test]
    fn blit_clips_negative_offset() {
        let mut buf = PixelBuffer::new(4, 4);
        let patch = PixelBuffer::filled(3, 3, [0, 0, 255, 255]);
        buf.blit(-2, -2, &patch);
        assert_eq!(buf.pixel(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(buf.pixel(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let buf = PixelBuffer::new(6, 3);
        let rotated = buf.rotated(Rotation::Cw90);
        assert_eq!((rotated.width(), rotated.height()), (3, 6));
        let half = buf.rotated(Rotation::Half);
        assert_eq!((half.width(), half.height()), (6, 3));
    }

    #[test]
    fn flip_moves_pixel() {
        let mut buf = PixelBuffer::new(4, 4);
        buf.set_pixel(0, 0, [10, 10, 10, 255]);
        let flipped = buf.flipped(true, false);
        assert_eq!(flipped.pixel(3, 0), Some([10, 10, 10, 255]));
        assert_eq!(flipped.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn straight_alpha_round_trip() {
        let buf = PixelBuffer::filled(2, 2, [200, 100, 50, 128]);
        let straight = buf.to_straight_rgba();
        let back = PixelBuffer::from_straight_rgba(&straight);
        for x in 0..2 {
            for y in 0..2 {
                let a = buf.pixel(x, y).unwrap();
                let b = back.pixel(x, y).unwrap();
                for c in 0..4 {
                    assert!((i16::from(a[c]) - i16::from(b[c])).abs() <= 1);
                }
            }
        }
    }

    #[test]
    fn unpremultiply_of_zero_alpha_is_zero() {
        assert_eq!(unpremultiply_channel(40, 0), 0);
        assert_eq!(premultiply_channel(255, 0), 0);
    }
}

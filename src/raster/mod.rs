// SPDX-License-Identifier: MPL-2.0
//! Pixel surfaces: premultiplied color buffers, coverage masks, dirty
//! rectangles, and blend kernels.

pub mod blend;
mod buffer;
mod mask;
mod rect;

pub use blend::BlendMode;
pub use buffer::{premultiply_channel, unpremultiply_channel, PixelBuffer, Rotation};
pub use mask::Mask;
pub use rect::Rect;

/// Multiplies mask coverage into all four premultiplied channels of
/// `buffer`, in place. Pixels outside the mask's extent are left as
/// they are.
pub fn apply_mask_coverage(buffer: &mut PixelBuffer, mask: &Mask) {
    let width = buffer.width().min(mask.width());
    let height = buffer.height().min(mask.height());
    for y in 0..height {
        for x in 0..width {
            let coverage = u16::from(mask.coverage(x, y));
            if coverage == 255 {
                continue;
            }
            if let Some(px) = buffer.pixel(x, y) {
                let scaled = px.map(|c| ((u16::from(c) * coverage + 127) / 255) as u8);
                buffer.set_pixel(x, y, scaled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_coverage_scales_all_channels() {
        let mut buffer = PixelBuffer::filled(2, 1, [255, 255, 255, 255]);
        let mut mask = Mask::filled(2, 1, 255);
        mask.set_coverage(1, 0, 128);
        apply_mask_coverage(&mut buffer, &mask);
        assert_eq!(buffer.pixel(0, 0), Some([255, 255, 255, 255]));
        let px = buffer.pixel(1, 0).expect("pixel");
        assert!(px[3].abs_diff(128) <= 1);
        assert_eq!(px[0], px[3]);
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Layer blend modes and the CPU compositing kernels behind them.
//!
//! All kernels operate on premultiplied RGBA8 and implement Porter-Duff
//! source-over with the separable blend function applied to
//! unpremultiplied color:
//!
//! ```text
//! out_a = sa + da * (1 - sa)
//! out_p = sp * (1 - da) + dp * (1 - sa) + B(sc, dc) * sa * da
//! ```
//!
//! Layer opacity scales the premultiplied source before compositing,
//! which for fully covered pixels is exactly
//! `out = dst * (1 - opacity) + blend(dst, src) * opacity`.

use serde::{Deserialize, Serialize};

/// The per-pixel combining function used when compositing a layer onto
/// the accumulated output.
///
/// The set is closed; names on the persistence boundary are
/// kebab-case, and unknown names fall back to [`BlendMode::Normal`]
/// via [`BlendMode::from_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    pub const ALL: [BlendMode; 12] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Darken,
        BlendMode::Lighten,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Exclusion,
    ];

    /// Kebab-case name used in manifests.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
        }
    }

    /// Parses a mode name; unknown or unsupported names fall back to
    /// normal "over" compositing.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == name)
            .unwrap_or(BlendMode::Normal)
    }
}

#[inline]
fn mul_div255(a: u16, b: u16) -> u8 {
    ((a * b + 127) / 255) as u8
}

#[inline]
fn add_sat(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

// Integer fast path for normal "over" with opacity-scaled source.
fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) {
    let op = (opacity.clamp(0.0, 1.0) * 255.0).round() as u16;
    if op == 0 {
        return;
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = mul_div255(u16::from(s[3]), op);
        if sa == 0 {
            continue;
        }
        let inv = 255u16 - u16::from(sa);
        for c in 0..3 {
            let sc = mul_div255(u16::from(s[c]), op);
            let dc = mul_div255(u16::from(d[c]), inv);
            d[c] = add_sat(sc, dc);
        }
        d[3] = add_sat(sa, mul_div255(u16::from(d[3]), inv));
    }
}

// Generic float path: source-over with a separable blend function on
// unpremultiplied channels.
fn over_in_place_blend<F>(dst: &mut [u8], src: &[u8], opacity: f32, blend_fn: F)
where
    F: Fn(f32, f32) -> f32,
{
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return;
    }

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sp = [
            (f32::from(s[0]) / 255.0) * opacity,
            (f32::from(s[1]) / 255.0) * opacity,
            (f32::from(s[2]) / 255.0) * opacity,
        ];
        let sa = (f32::from(s[3]) / 255.0) * opacity;
        if sa <= 0.0 {
            continue;
        }

        let dp = [
            f32::from(d[0]) / 255.0,
            f32::from(d[1]) / 255.0,
            f32::from(d[2]) / 255.0,
        ];
        let da = f32::from(d[3]) / 255.0;

        let inv_sa = 1.0 - sa;
        let out_a = (sa + da * inv_sa).clamp(0.0, 1.0);

        for c in 0..3 {
            let sc = (sp[c] / sa).clamp(0.0, 1.0);
            let dc = if da > 0.0 {
                (dp[c] / da).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let blended = blend_fn(sc, dc).clamp(0.0, 1.0);
            let out = sp[c] * (1.0 - da) + dp[c] * inv_sa + blended * sa * da;
            d[c] = (out.clamp(0.0, out_a) * 255.0).round() as u8;
        }
        d[3] = (out_a * 255.0).round() as u8;
    }
}

/// Composites `src` over `dst` in place with the given blend mode and
/// scalar opacity. Both slices are premultiplied RGBA8 of equal length.
///
/// Blend dispatch is chosen once per call, not per pixel.
pub fn composite_over(dst: &mut [u8], src: &[u8], opacity: f32, mode: BlendMode) {
    debug_assert_eq!(dst.len(), src.len());
    debug_assert_eq!(dst.len() % 4, 0);

    match mode {
        BlendMode::Normal => over_in_place(dst, src, opacity),
        BlendMode::Multiply => over_in_place_blend(dst, src, opacity, |s, d| s * d),
        BlendMode::Screen => over_in_place_blend(dst, src, opacity, |s, d| s + d - s * d),
        BlendMode::Overlay => over_in_place_blend(dst, src, opacity, |s, d| {
            if d <= 0.5 {
                2.0 * s * d
            } else {
                1.0 - 2.0 * (1.0 - s) * (1.0 - d)
            }
        }),
        BlendMode::Darken => over_in_place_blend(dst, src, opacity, |s, d| s.min(d)),
        BlendMode::Lighten => over_in_place_blend(dst, src, opacity, |s, d| s.max(d)),
        BlendMode::ColorDodge => over_in_place_blend(dst, src, opacity, |s, d| {
            if s >= 1.0 {
                1.0
            } else {
                (d / (1.0 - s)).min(1.0)
            }
        }),
        BlendMode::ColorBurn => over_in_place_blend(dst, src, opacity, |s, d| {
            if s <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - d) / s).min(1.0)
            }
        }),
        BlendMode::HardLight => over_in_place_blend(dst, src, opacity, |s, d| {
            if s <= 0.5 {
                2.0 * s * d
            } else {
                1.0 - 2.0 * (1.0 - s) * (1.0 - d)
            }
        }),
        BlendMode::SoftLight => over_in_place_blend(dst, src, opacity, |s, d| {
            if s <= 0.5 {
                d - (1.0 - 2.0 * s) * d * (1.0 - d)
            } else {
                let g = if d <= 0.25 {
                    ((16.0 * d - 12.0) * d + 4.0) * d
                } else {
                    d.sqrt()
                };
                d + (2.0 * s - 1.0) * (g - d)
            }
        }),
        BlendMode::Difference => over_in_place_blend(dst, src, opacity, |s, d| (d - s).abs()),
        BlendMode::Exclusion => {
            over_in_place_blend(dst, src, opacity, |s, d| d + s - 2.0 * d * s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rgba: [u8; 4], pixels: usize) -> Vec<u8> {
        rgba.iter()
            .copied()
            .cycle()
            .take(pixels * 4)
            .collect()
    }

    #[test]
    fn normal_over_half_opacity_averages() {
        let mut dst = solid([255, 255, 255, 255], 4);
        let src = solid([0, 0, 0, 255], 4);
        composite_over(&mut dst, &src, 0.5, BlendMode::Normal);
        for px in dst.chunks_exact(4) {
            for c in 0..3 {
                assert!(
                    (i16::from(px[c]) - 127).abs() <= 1,
                    "channel {} was {}",
                    c,
                    px[c]
                );
            }
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn normal_over_opaque_replaces() {
        let mut dst = solid([255, 255, 255, 255], 2);
        let src = solid([10, 20, 30, 255], 2);
        composite_over(&mut dst, &src, 1.0, BlendMode::Normal);
        assert_eq!(&dst[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn zero_opacity_is_identity() {
        let mut dst = solid([40, 50, 60, 255], 2);
        let src = solid([200, 200, 200, 255], 2);
        composite_over(&mut dst, &src, 0.0, BlendMode::Normal);
        assert_eq!(&dst[..4], &[40, 50, 60, 255]);
        composite_over(&mut dst, &src, 0.0, BlendMode::Multiply);
        assert_eq!(&dst[..4], &[40, 50, 60, 255]);
    }

    #[test]
    fn multiply_darkens() {
        // 50% gray over white multiplies to 50% gray.
        let mut dst = solid([255, 255, 255, 255], 1);
        let src = solid([128, 128, 128, 255], 1);
        composite_over(&mut dst, &src, 1.0, BlendMode::Multiply);
        for c in 0..3 {
            assert!((i16::from(dst[c]) - 128).abs() <= 1);
        }
        assert_eq!(dst[3], 255);
    }

    #[test]
    fn screen_lightens() {
        let mut dst = solid([128, 128, 128, 255], 1);
        let src = solid([128, 128, 128, 255], 1);
        composite_over(&mut dst, &src, 1.0, BlendMode::Screen);
        // s + d - s*d = 0.502 + 0.502 - 0.252 = 0.752
        for c in 0..3 {
            assert!((i16::from(dst[c]) - 192).abs() <= 2);
        }
    }

    #[test]
    fn difference_of_equal_colors_is_black() {
        let mut dst = solid([100, 150, 200, 255], 1);
        let src = solid([100, 150, 200, 255], 1);
        composite_over(&mut dst, &src, 1.0, BlendMode::Difference);
        assert_eq!(&dst[..3], &[0, 0, 0]);
        assert_eq!(dst[3], 255);
    }

    #[test]
    fn transparent_source_leaves_destination() {
        let mut dst = solid([40, 50, 60, 255], 1);
        let src = solid([0, 0, 0, 0], 1);
        composite_over(&mut dst, &src, 1.0, BlendMode::Overlay);
        assert_eq!(&dst[..4], &[40, 50, 60, 255]);
    }

    #[test]
    fn over_transparent_destination_keeps_source() {
        let mut dst = solid([0, 0, 0, 0], 1);
        let src = solid([100, 50, 25, 255], 1);
        composite_over(&mut dst, &src, 1.0, BlendMode::Normal);
        assert_eq!(&dst[..4], &[100, 50, 25, 255]);
    }

    #[test]
    fn unknown_mode_name_falls_back_to_normal() {
        assert_eq!(BlendMode::from_name("plasma"), BlendMode::Normal);
        assert_eq!(BlendMode::from_name("color-dodge"), BlendMode::ColorDodge);
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in BlendMode::ALL {
            assert_eq!(BlendMode::from_name(mode.as_str()), mode);
        }
    }

    #[test]
    fn output_stays_premultiplied() {
        let mut dst = solid([60, 60, 60, 120], 1);
        let src = solid([30, 80, 90, 200], 1);
        for mode in BlendMode::ALL {
            let mut d = dst.clone();
            composite_over(&mut d, &src, 0.7, mode);
            for c in 0..3 {
                assert!(d[c] <= d[3], "mode {:?} broke premultiplication", mode);
            }
        }
        composite_over(&mut dst, &src, 1.0, BlendMode::Normal);
    }
}

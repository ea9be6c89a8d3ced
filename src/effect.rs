// SPDX-License-Identifier: MPL-2.0
//! Adjustment effects and their registry.
//!
//! Effects are pure functions from a pixel buffer (plus a numeric
//! configuration) to a new pixel buffer. They are registered into an
//! [`EffectRegistry`] by an explicit bootstrap call; there is no
//! process-wide singleton and no runtime type discovery. Failure is a
//! checked return path ([`EffectError`]), never a panic.

use crate::error::EffectError;
use crate::raster::{premultiply_channel, unpremultiply_channel, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Numeric effect parameters, keyed by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectConfig(BTreeMap<String, f64>);

impl EffectConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Reads a parameter, falling back to a default when absent.
    #[must_use]
    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }
}

/// A registered adjustment effect.
///
/// `apply` must not mutate its input; a fresh buffer comes back so the
/// caller can decide what to do with it (swap it in, discard on undo
/// capture failure, and so on).
pub trait Effect {
    /// Stable name used for registration and adjustment-layer bindings.
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        input: &PixelBuffer,
        config: &EffectConfig,
    ) -> std::result::Result<PixelBuffer, EffectError>;
}

/// Explicitly constructed effect table, dependency-injected into the
/// document rather than reached through a global.
#[derive(Default)]
pub struct EffectRegistry {
    effects: HashMap<&'static str, Box<dyn Effect>>,
}

impl EffectRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in reference effects.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(Invert));
        registry.register(Box::new(Grayscale));
        registry.register(Box::new(Brightness));
        registry.register(Box::new(Contrast));
        registry
    }

    pub fn register(&mut self, effect: Box<dyn Effect>) {
        self.effects.insert(effect.name(), effect);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Effect> {
        self.effects.get(name).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    /// Registered effect names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.effects.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("effects", &self.names())
            .finish()
    }
}

// =============================================================================
// Built-in effects
// =============================================================================

// Color math happens on straight alpha; doing it on premultiplied
// channels produces darkening artifacts near transparent edges.
fn map_channels<F>(input: &PixelBuffer, f: F) -> PixelBuffer
where
    F: Fn([u8; 3]) -> [u8; 3],
{
    let mut out = input.clone();
    for px in out.as_bytes_mut().chunks_exact_mut(4) {
        let a = px[3];
        let straight = [
            unpremultiply_channel(px[0], a),
            unpremultiply_channel(px[1], a),
            unpremultiply_channel(px[2], a),
        ];
        let mapped = f(straight);
        px[0] = premultiply_channel(mapped[0], a);
        px[1] = premultiply_channel(mapped[1], a);
        px[2] = premultiply_channel(mapped[2], a);
    }
    out
}

/// Inverts color channels; alpha is untouched.
pub struct Invert;

impl Effect for Invert {
    fn name(&self) -> &'static str {
        "invert"
    }

    fn apply(
        &self,
        input: &PixelBuffer,
        _config: &EffectConfig,
    ) -> std::result::Result<PixelBuffer, EffectError> {
        Ok(map_channels(input, |[r, g, b]| {
            [255 - r, 255 - g, 255 - b]
        }))
    }
}

/// Luma-weighted desaturation.
pub struct Grayscale;

impl Effect for Grayscale {
    fn name(&self) -> &'static str {
        "grayscale"
    }

    fn apply(
        &self,
        input: &PixelBuffer,
        _config: &EffectConfig,
    ) -> std::result::Result<PixelBuffer, EffectError> {
        Ok(map_channels(input, |[r, g, b]| {
            let luma = (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b))
                .round()
                .clamp(0.0, 255.0) as u8;
            [luma, luma, luma]
        }))
    }
}

fn percent_amount(config: &EffectConfig) -> std::result::Result<f64, EffectError> {
    let amount = config.get_or("amount", 0.0);
    if !(-100.0..=100.0).contains(&amount) {
        return Err(EffectError::BadConfig(format!(
            "amount must be in [-100, 100], got {}",
            amount
        )));
    }
    Ok(amount)
}

/// Additive brightness; `amount` in `[-100, 100]` percent.
pub struct Brightness;

impl Effect for Brightness {
    fn name(&self) -> &'static str {
        "brightness"
    }

    fn apply(
        &self,
        input: &PixelBuffer,
        config: &EffectConfig,
    ) -> std::result::Result<PixelBuffer, EffectError> {
        let amount = percent_amount(config)?;
        let delta = amount * 255.0 / 100.0;
        Ok(map_channels(input, |rgb| {
            rgb.map(|c| (f64::from(c) + delta).round().clamp(0.0, 255.0) as u8)
        }))
    }
}

/// Contrast around mid-gray; `amount` in `[-100, 100]` percent.
pub struct Contrast;

impl Effect for Contrast {
    fn name(&self) -> &'static str {
        "contrast"
    }

    fn apply(
        &self,
        input: &PixelBuffer,
        config: &EffectConfig,
    ) -> std::result::Result<PixelBuffer, EffectError> {
        let amount = percent_amount(config)?;
        let factor = (100.0 + amount) / 100.0;
        Ok(map_channels(input, |rgb| {
            rgb.map(|c| ((f64::from(c) - 128.0) * factor + 128.0).round().clamp(0.0, 255.0) as u8)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_bootstrap_contains_builtins() {
        let registry = EffectRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["brightness", "contrast", "grayscale", "invert"]
        );
        assert!(registry.get("invert").is_some());
        assert!(registry.get("vortex").is_none());
    }

    #[test]
    fn invert_flips_channels() {
        let buf = PixelBuffer::filled(2, 2, [255, 0, 100, 255]);
        let out = Invert
            .apply(&buf, &EffectConfig::default())
            .expect("invert");
        assert_eq!(out.pixel(0, 0), Some([0, 255, 155, 255]));
    }

    #[test]
    fn invert_preserves_alpha_and_premultiplication() {
        let buf = PixelBuffer::filled(1, 1, [255, 255, 255, 128]);
        let out = Invert
            .apply(&buf, &EffectConfig::default())
            .expect("invert");
        let px = out.pixel(0, 0).expect("pixel");
        assert_eq!(px[3], 128);
        // White inverts to black; premultiplied black is still black.
        assert_eq!(&px[..3], &[0, 0, 0]);
    }

    #[test]
    fn grayscale_of_pure_green() {
        let buf = PixelBuffer::filled(1, 1, [0, 255, 0, 255]);
        let out = Grayscale
            .apply(&buf, &EffectConfig::default())
            .expect("grayscale");
        let px = out.pixel(0, 0).expect("pixel");
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[0], 150); // 0.587 * 255
    }

    #[test]
    fn brightness_shifts_values() {
        let buf = PixelBuffer::filled(1, 1, [100, 100, 100, 255]);
        let config = EffectConfig::new().with("amount", 20.0);
        let out = Brightness.apply(&buf, &config).expect("brightness");
        assert_eq!(out.pixel(0, 0), Some([151, 151, 151, 255]));
    }

    #[test]
    fn out_of_range_amount_is_bad_config() {
        let buf = PixelBuffer::new(1, 1);
        let config = EffectConfig::new().with("amount", 250.0);
        let err = Brightness.apply(&buf, &config).unwrap_err();
        assert!(matches!(err, EffectError::BadConfig(_)));
        let err = Contrast.apply(&buf, &config).unwrap_err();
        assert!(matches!(err, EffectError::BadConfig(_)));
    }

    #[test]
    fn contrast_expands_around_midgray() {
        let buf = PixelBuffer::filled(1, 1, [200, 64, 128, 255]);
        let config = EffectConfig::new().with("amount", 50.0);
        let out = Contrast.apply(&buf, &config).expect("contrast");
        let px = out.pixel(0, 0).expect("pixel");
        assert_eq!(px[0], 236); // (200-128)*1.5+128
        assert_eq!(px[1], 32); // (64-128)*1.5+128
        assert_eq!(px[2], 128);
    }
}

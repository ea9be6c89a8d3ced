// SPDX-License-Identifier: MPL-2.0
//! Project manifests and PNG interop.
//!
//! The core does not read or write project archives itself; it exposes
//! a serde-friendly snapshot of the document ([`DocumentManifest`]), a
//! rehydration constructor, and lossless PNG helpers for the layer
//! buffers. The outer persistence layer decides where the bytes live.
//!
//! Blend modes travel as their string names so a manifest written by a
//! newer build with extra modes still loads; unknown names fall back
//! to normal.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{Error, Result};
use crate::layer::{Layer, LayerId};
use crate::raster::{BlendMode, PixelBuffer};

/// Per-layer record in a project manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerManifest {
    pub id: u64,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub blend_mode: String,
    /// Name of the PNG holding this layer's pixels inside the project
    /// archive.
    pub filename: String,
}

/// Snapshot of everything needed to rebuild a document, minus the
/// pixels themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentManifest {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<LayerManifest>,
}

/// Canonical archive filename for a layer's pixels.
#[must_use]
pub fn layer_filename(id: LayerId) -> String {
    format!("layer_{}.png", id.raw())
}

/// Writes a buffer as a straight-alpha PNG.
pub fn encode_png(buffer: &PixelBuffer, path: &Path) -> Result<()> {
    buffer
        .to_straight_rgba()
        .save_with_format(path, image_rs::ImageFormat::Png)?;
    Ok(())
}

/// Reads a PNG back into a premultiplied buffer.
pub fn decode_png(path: &Path) -> Result<PixelBuffer> {
    let image = image_rs::open(path)?.to_rgba8();
    Ok(PixelBuffer::from_straight_rgba(&image))
}

/// Renders the composite and writes it as one PNG, transparency kept.
pub fn export_flat(document: &mut Document, path: &Path) -> Result<()> {
    let rendered = document.render();
    encode_png(&rendered, path)
}

impl Document {
    /// Snapshot of the document's structure for persistence.
    #[must_use]
    pub fn manifest(&self) -> DocumentManifest {
        DocumentManifest {
            width: self.width(),
            height: self.height(),
            layers: self
                .layers()
                .iter()
                .map(|layer| LayerManifest {
                    id: layer.id().raw(),
                    name: layer.name().to_owned(),
                    visible: layer.visible(),
                    opacity: layer.opacity(),
                    blend_mode: layer.blend_mode().as_str().to_owned(),
                    filename: layer_filename(layer.id()),
                })
                .collect(),
        }
    }

    /// Rebuilds a document from a manifest. `load` supplies each
    /// layer's pixels (typically decoded from the archive); a `None`
    /// leaves that layer transparent, matching a missing file in the
    /// archive. Rehydrated layers keep their persisted ids, and
    /// nothing here enters the history.
    pub fn from_manifest(
        manifest: &DocumentManifest,
        mut load: impl FnMut(&LayerManifest) -> Option<PixelBuffer>,
    ) -> Result<Document> {
        if manifest.width == 0 || manifest.height == 0 {
            return Err(Error::Manifest(format!(
                "invalid canvas size {}x{}",
                manifest.width, manifest.height
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for record in &manifest.layers {
            if !seen.insert(record.id) {
                return Err(Error::Manifest(format!("duplicate layer id {}", record.id)));
            }
        }

        let mut document = Document::new(manifest.width, manifest.height);
        for record in &manifest.layers {
            let mut layer = Layer::new(manifest.width, manifest.height, &record.name)
                .with_id(LayerId::from_raw(record.id));
            layer.set_visible(record.visible);
            layer.set_opacity(record.opacity);
            layer.set_blend_mode(BlendMode::from_name(&record.blend_mode));
            if let Some(buffer) = load(record) {
                *layer.buffer_mut() = buffer;
            }
            let index = document.state().layers().len();
            document.state_mut().insert_layer(index, layer);
        }
        let last = document.layers().len().checked_sub(1);
        document.state_mut().set_active_layer(last);
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::BlendMode;

    fn sample_document() -> Document {
        let mut doc = Document::new(12, 10);
        doc.add_layer("base");
        doc.add_layer("detail");
        doc.set_layer_opacity(1, 0.75);
        doc.set_layer_blend_mode(1, BlendMode::Multiply);
        doc.set_layer_visibility(0, false);
        doc
    }

    #[test]
    fn manifest_records_layer_order_and_properties() {
        let doc = sample_document();
        let manifest = doc.manifest();
        assert_eq!((manifest.width, manifest.height), (12, 10));
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(manifest.layers[0].name, "base");
        assert!(!manifest.layers[0].visible);
        assert_eq!(manifest.layers[1].blend_mode, "multiply");
        assert_eq!(manifest.layers[1].opacity, 0.75);
        assert_eq!(
            manifest.layers[0].filename,
            format!("layer_{}.png", manifest.layers[0].id)
        );
    }

    #[test]
    fn manifest_round_trip_preserves_structure() {
        let mut doc = sample_document();
        doc.fill([30, 60, 90, 255]);
        let manifest = doc.manifest();
        let pixels = doc.layers()[1].buffer().clone();

        let restored = Document::from_manifest(&manifest, |record| {
            (record.name == "detail").then(|| pixels.clone())
        })
        .expect("rehydrate");

        assert_eq!(restored.manifest(), manifest);
        assert_eq!(
            restored.layers()[1].buffer().pixel(3, 3),
            Some([30, 60, 90, 255])
        );
        // Unsupplied pixels stay transparent.
        assert_eq!(restored.layers()[0].buffer().pixel(0, 0), Some([0, 0, 0, 0]));
        assert!(restored.history().is_empty());
    }

    #[test]
    fn unknown_blend_mode_falls_back_to_normal() {
        let manifest = DocumentManifest {
            width: 4,
            height: 4,
            layers: vec![LayerManifest {
                id: 1,
                name: "l".into(),
                visible: true,
                opacity: 1.0,
                blend_mode: "plasma-burn".into(),
                filename: "layer_1.png".into(),
            }],
        };
        let doc = Document::from_manifest(&manifest, |_| None).expect("rehydrate");
        assert_eq!(doc.layers()[0].blend_mode(), BlendMode::Normal);
    }

    #[test]
    fn invalid_manifests_are_refused() {
        let empty = DocumentManifest {
            width: 0,
            height: 4,
            layers: Vec::new(),
        };
        assert!(matches!(
            Document::from_manifest(&empty, |_| None),
            Err(Error::Manifest(_))
        ));

        let record = LayerManifest {
            id: 7,
            name: "l".into(),
            visible: true,
            opacity: 1.0,
            blend_mode: "normal".into(),
            filename: "layer_7.png".into(),
        };
        let duplicated = DocumentManifest {
            width: 4,
            height: 4,
            layers: vec![record.clone(), record],
        };
        assert!(matches!(
            Document::from_manifest(&duplicated, |_| None),
            Err(Error::Manifest(_))
        ));
    }

    #[test]
    fn manifest_survives_toml() {
        let manifest = sample_document().manifest();
        let text = toml::to_string(&manifest).expect("serialize");
        let back: DocumentManifest = toml::from_str(&text).expect("deserialize");
        assert_eq!(back, manifest);
    }

    #[test]
    fn png_round_trip_is_lossless_for_opaque_pixels() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("layer.png");
        let mut buffer = PixelBuffer::new(5, 4);
        buffer.set_pixel(0, 0, [255, 0, 0, 255]);
        buffer.set_pixel(4, 3, [0, 128, 255, 255]);

        encode_png(&buffer, &path).expect("encode");
        let back = decode_png(&path).expect("decode");
        assert_eq!(back.width(), 5);
        assert_eq!(back.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(back.pixel(4, 3), Some([0, 128, 255, 255]));
        assert_eq!(back.pixel(2, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn export_flat_writes_the_composite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("flat.png");
        let mut doc = Document::new(3, 3);
        doc.add_layer("l");
        doc.fill([10, 200, 40, 255]);

        export_flat(&mut doc, &path).expect("export");
        let back = decode_png(&path).expect("decode");
        assert_eq!(back.pixel(1, 1), Some([10, 200, 40, 255]));
    }
}

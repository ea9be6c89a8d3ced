// SPDX-License-Identifier: MPL-2.0
//! `lamina` is the core engine of a layered raster image editor.
//!
//! It provides the in-memory document model (layers, masks,
//! selection), the CPU compositing pipeline that flattens the layer
//! stack into a displayable image, and an undo/redo engine that keeps
//! every mutation reversible under a bounded memory budget. Windowing,
//! tools, and project archives live in outer crates.

#![doc(html_root_url = "https://docs.rs/lamina/0.1.0")]

pub mod command;
pub mod compositor;
pub mod config;
pub mod document;
pub mod effect;
pub mod error;
pub mod event;
pub mod history;
pub mod layer;
pub mod project;
pub mod raster;
pub mod selection;

// SPDX-License-Identifier: MPL-2.0
//! Default values for engine configuration.

/// Default undo history memory budget in megabytes.
///
/// Byte-based accounting lets one full-canvas snapshot count for what
/// it actually costs instead of competing with tiny structural edits
/// on equal terms.
pub const DEFAULT_HISTORY_MEMORY_LIMIT_MB: u32 = 500;

/// Hard backstop on the number of undo entries, regardless of size.
pub const DEFAULT_HISTORY_ENTRY_LIMIT: usize = 100;

/// Default canvas width for new documents.
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;

/// Default canvas height for new documents.
pub const DEFAULT_CANVAS_HEIGHT: u32 = 600;

// SPDX-License-Identifier: MPL-2.0
//! Integer rectangles for dirty-region tracking.

/// An axis-aligned integer rectangle.
///
/// Used as the bounding box of pixels actually touched by an edit, so
/// undo snapshots only capture the changed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The full extent of a `width x height` surface.
    #[must_use]
    pub fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    #[must_use]
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Intersection of two rectangles, or `None` when they do not overlap.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if i64::from(x0) >= x1 || i64::from(y0) >= y1 {
            return None;
        }
        // x1/y1 are bounded by the i32 operands above, so the casts are lossless.
        Some(Rect::new(
            x0,
            y0,
            (x1 - i64::from(x0)) as u32,
            (y1 - i64::from(y0)) as u32,
        ))
    }

    /// Clamps this rectangle to a surface of the given dimensions.
    #[must_use]
    pub fn clamped_to(&self, width: u32, height: u32) -> Option<Rect> {
        self.intersect(&Rect::of_size(width, height))
    }

    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && i64::from(x) < self.right()
            && i64::from(y) < self.bottom()
    }
}

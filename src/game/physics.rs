//! Collision geometry - axis-aligned bounding boxes

use crate::config::BoxSize;

/// A box centered on an entity position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Hitbox {
    pub fn new(x: f32, y: f32, size: BoxSize) -> Self {
        Self {
            x,
            y,
            width: size.width,
            height: size.height,
        }
    }

    /// Overlap test on center distance against combined extents.
    ///
    /// Touching edges do not count as an overlap.
    pub fn intersects(&self, other: &Hitbox) -> bool {
        (self.x - other.x).abs() * 2.0 < self.width + other.width
            && (self.y - other.y).abs() * 2.0 < self.height + other.height
    }
}

//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Geometric types shared by the rendering backend.
use cgmath::{Point2, Vector2};

/// An axis-aligned rectangle defined by its minimum (inclusive) and
/// maximum (exclusive) corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect2D<T> {
    pub min: Point2<T>,
    pub max: Point2<T>,
}

impl<T: num_traits::Num + PartialOrd + Copy> Rect2D<T> {
    pub fn new(min: Point2<T>, max: Point2<T>) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> Vector2<T> {
        Vector2::new(self.max.x - self.min.x, self.max.y - self.min.y)
    }

    pub fn is_empty(&self) -> bool {
        !(self.min.x < self.max.x && self.min.y < self.max.y)
    }

    /// Return whether `self` entirely contains `other`.
    pub fn contains_rect(&self, other: &Rect2D<T>) -> bool {
        other.is_empty()
            || (self.min.x <= other.min.x
                && self.min.y <= other.min.y
                && self.max.x >= other.max.x
                && self.max.y >= other.max.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_size() {
        let r = Rect2D::new(Point2::new(2u32, 3), Point2::new(10, 7));
        assert_eq!(r.size(), Vector2::new(8, 4));
        assert!(!r.is_empty());
    }

    #[test]
    fn rect_contains() {
        let outer = Rect2D::new(Point2::new(0u32, 0), Point2::new(16, 16));
        let inner = Rect2D::new(Point2::new(4u32, 4), Point2::new(8, 8));
        assert!(outer.contains_rect(&inner));
        assert!(!inner.contains_rect(&outer));
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Points, sizes and rectangles in grid content coordinates

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis along which the grid scrolls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScrollDirection {
    Vertical,
    #[default]
    Horizontal,
}

/// Axis-aligned rectangle with its origin at the top left
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        origin: Point { x: 0.0, y: 0.0 },
        size: Size {
            width: 0.0,
            height: 0.0,
        },
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point { x, y },
            size: Size { width, height },
        }
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn mid_x(&self) -> f64 {
        self.origin.x + self.size.width / 2.0
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    pub fn mid_y(&self) -> f64 {
        self.origin.y + self.size.height / 2.0
    }

    pub fn is_empty(&self) -> bool {
        self.size.width <= 0.0 || self.size.height <= 0.0
    }

    /// Grow by `dx` on the left and right and by `dy` on the top and bottom
    pub fn outset_by(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(
            self.origin.x - dx,
            self.origin.y - dy,
            self.size.width + 2.0 * dx,
            self.size.height + 2.0 * dy,
        )
    }

    /// Overlap with a non-zero area; empty rectangles intersect nothing
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min_x() < other.max_x()
            && other.min_x() < self.max_x()
            && self.min_y() < other.max_y()
            && other.min_y() < self.max_y()
    }

    /// Start, extent and midpoint along the scroll axis
    pub fn span(&self, direction: ScrollDirection) -> (f64, f64, f64) {
        match direction {
            ScrollDirection::Vertical => (self.min_y(), self.size.height, self.mid_y()),
            ScrollDirection::Horizontal => (self.min_x(), self.size.width, self.mid_x()),
        }
    }
}

/// Position of a cell in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPath {
    pub section: usize,
    pub item: usize,
}

impl IndexPath {
    pub fn new(item: usize, section: usize) -> Self {
        Self { section, item }
    }
}

impl std::fmt::Display for IndexPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

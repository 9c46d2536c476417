//! Geometry primitives shared by slides, finders and patch sets.
//!
//! Coordinates are always expressed in the pixel frame of one pyramid level.
//! Nothing here remembers how levels relate to each other; callers convert
//! between levels with [`scale_factor`].

use std::fmt;

/// Integer pixel coordinate.
///
/// Signed so that border and jitter offsets can push a window past the
/// top-left corner before it is clipped back inside the slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Integer width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square size with equal edges.
    pub const fn square(edge: u32) -> Self {
        Self {
            width: edge,
            height: edge,
        }
    }

    /// Raster shape as `(rows, cols)`, i.e. `(height, width)`.
    pub fn as_shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A rectangular window inside one pyramid level of one slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Pyramid level (0 = full resolution)
    pub level: u32,

    /// Top-left corner in the level's own pixel frame
    pub location: Point,

    /// Window size in the level's own pixels
    pub size: Size,
}

impl Region {
    pub const fn new(level: u32, location: Point, size: Size) -> Self {
        Self {
            level,
            location,
            size,
        }
    }

    /// Square window of edge `edge` at `(x, y)` on `level`.
    pub const fn square(x: i64, y: i64, edge: u32, level: u32) -> Self {
        Self {
            level,
            location: Point::new(x, y),
            size: Size::square(edge),
        }
    }

    /// Whole extent of a level.
    pub const fn full_level(level: u32, size: Size) -> Self {
        Self {
            level,
            location: Point::new(0, 0),
            size,
        }
    }

    /// `(x, y, width, height, level)` tuple.
    pub fn as_values(&self) -> (i64, i64, u32, u32, u32) {
        (
            self.location.x,
            self.location.y,
            self.size.width,
            self.size.height,
            self.level,
        )
    }
}

/// Factor between two levels of a power-of-two pyramid.
///
/// `scale_factor(5, 0)` is 32: one pixel at level 5 spans 32 pixels at
/// level 0. Returns `None` when `coarse < fine`.
pub fn scale_factor(coarse: u32, fine: u32) -> Option<u32> {
    let shift = coarse.checked_sub(fine)?;
    1u32.checked_shl(shift)
}

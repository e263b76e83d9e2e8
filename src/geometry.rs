//! Shared value types for screen geometry and touch coordinates.

use serde::{Deserialize, Serialize};

/// A point in screen pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn zeroes() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: Point) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        dx.hypot(dy)
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;

    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered, i.e. the byte length of an 8-bit gray buffer.
    pub fn total(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }
}

/// Axis-aligned rectangle: an origin plus a spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub origin: Point,
    pub spread: Size,
}

impl Rect {
    pub fn new(origin: Point, spread: Size) -> Self {
        Self { origin, spread }
    }

    pub fn from_size(spread: Size) -> Self {
        Self {
            origin: Point::zeroes(),
            spread,
        }
    }

    pub fn max_x(&self) -> i32 {
        self.origin.x + self.spread.width
    }

    pub fn max_y(&self) -> i32 {
        self.origin.y + self.spread.height
    }

    pub fn is_empty(&self) -> bool {
        self.spread.width <= 0 || self.spread.height <= 0
    }

    /// Inclusive containment on all edges, matching the tap hit-testing the
    /// screens rely on.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.origin.x && p.x <= self.max_x() && p.y >= self.origin.y && p.y <= self.max_y()
    }

    /// Intersection with another rectangle, or `None` when disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.origin.x.max(other.origin.x);
        let y0 = self.origin.y.max(other.origin.y);
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(
            Point::new(x0, y0),
            Size::new(x1 - x0, y1 - y0),
        ))
    }
}

/// Canonical screen rotations of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenRotation {
    Portrait,
    InvertedPortrait,
    LandscapePortLeft,
    LandscapePortRight,
}

/// Affine transform applied to raw touchscreen coordinates so that touches
/// line up with the rotated framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchCoordinateTransform {
    #[default]
    Identity,
    SwapAndMirrorY,
    MirrorXAndMirrorY,
    SwapAndMirrorX,
}

impl ScreenRotation {
    /// The transform matching each native rotation, per the panel's
    /// finger-trace behavior.
    pub fn touch_coordinate_transform(self) -> TouchCoordinateTransform {
        match self {
            ScreenRotation::Portrait => TouchCoordinateTransform::SwapAndMirrorX,
            ScreenRotation::LandscapePortRight => TouchCoordinateTransform::Identity,
            ScreenRotation::InvertedPortrait => TouchCoordinateTransform::SwapAndMirrorY,
            ScreenRotation::LandscapePortLeft => TouchCoordinateTransform::MirrorXAndMirrorY,
        }
    }
}

impl TouchCoordinateTransform {
    /// Applies the transform to a point reported by the touch controller.
    pub fn apply(self, p: Point, screen_size: Size) -> Point {
        match self {
            TouchCoordinateTransform::Identity => p,
            TouchCoordinateTransform::SwapAndMirrorY => Point::new(p.y, screen_size.height - p.x),
            TouchCoordinateTransform::MirrorXAndMirrorY => {
                Point::new(screen_size.width - p.x, screen_size.height - p.y)
            }
            TouchCoordinateTransform::SwapAndMirrorX => Point::new(screen_size.width - p.y, p.x),
        }
    }
}

/// What the display reports about itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenInfo {
    pub size: Size,
    pub dpi: f64,
    pub rotation: ScreenRotation,
}

impl ScreenInfo {
    pub fn touch_coordinate_transform(&self) -> TouchCoordinateTransform {
        self.rotation.touch_coordinate_transform()
    }
}

//! Screen-space geometry used by the navigation algorithms.
//!
//! All coordinates are device-independent pixels in a single screen space.
//! Per-surface coordinate conversion is the host's job; by the time a
//! rectangle reaches the engine it is already in screen space.

use serde::{Deserialize, Serialize};

/// A point in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Vector from `self` to `other`.
    #[must_use]
    pub fn to(self, other: Point) -> (f64, f64) {
        (other.x - self.x, other.y - self.y)
    }
}

/// An axis-aligned rectangle in screen space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point of the rectangle.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// A rectangle with no area or non-finite coordinates cannot be targeted.
    ///
    /// Hosts report such bounds mid-layout; they are treated as "no geometry".
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

impl From<[f64; 4]> for Rect {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Direction of a spatial move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Unit vector in screen space (y grows downwards).
    #[must_use]
    pub fn unit(self) -> (f64, f64) {
        match self {
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }

    /// Whether the move runs along the x axis.
    #[must_use]
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

/// Direction of a value adjustment in interactive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustDirection {
    Up,
    Down,
}

impl AdjustDirection {
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            AdjustDirection::Up => 1.0,
            AdjustDirection::Down => -1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_is_midpoint() {
        let r = Rect::new(10.0, 20.0, 100.0, 40.0);
        assert_eq!(r.center(), Point::new(60.0, 40.0));
    }

    #[test]
    fn zero_sized_rect_is_not_usable() {
        assert!(!Rect::new(0.0, 0.0, 0.0, 10.0).is_usable());
        assert!(!Rect::new(0.0, 0.0, 10.0, 0.0).is_usable());
        assert!(!Rect::new(f64::NAN, 0.0, 10.0, 10.0).is_usable());
        assert!(Rect::new(-5.0, -5.0, 1.0, 1.0).is_usable());
    }

    #[test]
    fn direction_units_point_the_right_way() {
        assert_eq!(Direction::Up.unit(), (0.0, -1.0));
        assert_eq!(Direction::Right.unit(), (1.0, 0.0));
        assert!(Direction::Left.is_horizontal());
        assert!(!Direction::Down.is_horizontal());
    }

    #[test]
    fn rect_from_array() {
        let r = Rect::from([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r, Rect::new(1.0, 2.0, 3.0, 4.0));
    }
}

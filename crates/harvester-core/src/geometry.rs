//! Pixel geometry shared by detection, selection, and input.
//!
//! Detection reports positions in *screenshot space*: pixel offsets into the
//! captured game window. Input devices work in *screen space*. The two differ
//! by the window offset captured when the controller is configured.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to a (possibly fractional) position.
    #[must_use]
    pub fn distance_to(&self, (cx, cy): (f64, f64)) -> f64 {
        (f64::from(self.x) - cx).hypot(f64::from(self.y) - cy)
    }

    #[must_use]
    pub fn offset_by(&self, offset: Point) -> Point {
        Point {
            x: self.x.saturating_add(offset.x),
            y: self.y.saturating_add(offset.y),
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Error returned when parsing a `Point` or `Rect` from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseGeometryError {
    #[error("expected {expected} comma-separated integers, got '{input}'")]
    WrongArity { expected: usize, input: String },
    #[error("invalid integer '{value}' in '{input}'")]
    InvalidNumber { value: String, input: String },
}

fn parse_fields<const N: usize>(input: &str) -> Result<[i64; N], ParseGeometryError> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(ParseGeometryError::WrongArity {
            expected: N,
            input: input.to_string(),
        });
    }
    let mut out = [0i64; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| ParseGeometryError::InvalidNumber {
                value: part.to_string(),
                input: input.to_string(),
            })?;
    }
    Ok(out)
}

fn narrow<T: TryFrom<i64>>(value: i64, input: &str) -> Result<T, ParseGeometryError> {
    T::try_from(value).map_err(|_| ParseGeometryError::InvalidNumber {
        value: value.to_string(),
        input: input.to_string(),
    })
}

/// Parses `"x,y"`.
impl FromStr for Point {
    type Err = ParseGeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x, y] = parse_fields::<2>(s)?;
        Ok(Point {
            x: narrow(x, s)?,
            y: narrow(y, s)?,
        })
    }
}

/// An axis-aligned rectangle in window space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, point: Point) -> bool {
        let (x, y) = (i64::from(point.x), i64::from(point.y));
        x >= i64::from(self.x)
            && y >= i64::from(self.y)
            && x < i64::from(self.x) + i64::from(self.width)
            && y < i64::from(self.y) + i64::from(self.height)
    }

    /// Clip this rectangle to an image of the given size.
    ///
    /// Returns `None` if nothing of the rectangle lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clipped = Rect {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        };
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Parses `"x,y,width,height"`.
impl FromStr for Rect {
    type Err = ParseGeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [x, y, width, height] = parse_fields::<4>(s)?;
        Ok(Rect {
            x: narrow(x, s)?,
            y: narrow(y, s)?,
            width: narrow(width, s)?,
            height: narrow(height, s)?,
        })
    }
}

/// Position and size of the captured game window on screen.
///
/// The offset is captured once. If the window moves after the controller
/// starts, screen translations will be wrong until it is reconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub offset: Point,
    pub width: u32,
    pub height: u32,
}

impl WindowGeometry {
    /// The player's position: always the centre of the window.
    pub fn center(&self) -> (f64, f64) {
        (f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    /// Translate a screenshot-space position into screen space.
    pub fn to_screen(&self, pos: Point) -> Point {
        pos.offset_by(self.offset)
    }
}

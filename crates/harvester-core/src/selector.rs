//! Proximity ordering of detected targets.

use crate::geometry::{Point, WindowGeometry};

/// Default radius around the player inside which targets are ignored.
///
/// Deposits this close are usually the one just collected.
pub const DEFAULT_IGNORE_RADIUS: f64 = 130.0;

/// Orders targets by distance from the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSelector {
    center: (f64, f64),
    ignore_radius: f64,
}

impl TargetSelector {
    pub fn new(center: (f64, f64), ignore_radius: f64) -> Self {
        Self {
            center,
            ignore_radius,
        }
    }

    /// Selector centred on the player in the given window.
    pub fn for_window(window: &WindowGeometry, ignore_radius: f64) -> Self {
        Self::new(window.center(), ignore_radius)
    }

    pub fn center(&self) -> (f64, f64) {
        self.center
    }

    pub fn ignore_radius(&self) -> f64 {
        self.ignore_radius
    }

    /// Return `targets` nearest first, dropping any within the ignore radius.
    ///
    /// Equidistant targets keep their input order.
    #[must_use]
    pub fn order(&self, targets: &[Point]) -> Vec<Point> {
        let mut ranked: Vec<(Point, f64)> = targets
            .iter()
            .map(|t| (*t, t.distance_to(self.center)))
            .filter(|(_, distance)| *distance > self.ignore_radius)
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.into_iter().map(|(t, _)| t).collect()
    }
}

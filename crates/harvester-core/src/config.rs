//! Controller configuration.

use std::time::Duration;

use crate::error::ApiError;
use crate::geometry::{Rect, WindowGeometry};
use crate::selector::DEFAULT_IGNORE_RADIUS;

/// Size of the on-screen coordinate readout used for motion detection.
pub const COORDINATE_READOUT_WIDTH: u32 = 75;
pub const COORDINATE_READOUT_HEIGHT: u32 = 20;

/// Timings and thresholds for the controller loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub window: WindowGeometry,
    /// Targets closer than this to the player are never clicked.
    pub ignore_radius: f64,
    /// Time after start before the controller begins searching.
    pub warmup: Duration,
    /// Pause between pointer move and click, letting the tooltip render.
    pub settle_delay: Duration,
    /// Pause before the single retry after a failed click.
    pub retry_pause: Duration,
    /// Wait before checking motion when both click attempts failed.
    pub fallback_wait: Duration,
    /// Motion re-check interval while collecting.
    pub collect_poll: Duration,
    /// Poll interval for phases with nothing to do.
    pub idle_poll: Duration,
    /// Pause after a failed tick before the loop continues.
    pub error_backoff: Duration,
}

impl ControllerConfig {
    pub fn new(window: WindowGeometry) -> Self {
        Self {
            window,
            ignore_radius: DEFAULT_IGNORE_RADIUS,
            warmup: Duration::from_secs(6),
            settle_delay: Duration::from_millis(1250),
            retry_pause: Duration::from_secs(1),
            fallback_wait: Duration::from_secs(3),
            collect_poll: Duration::from_secs(1),
            idle_poll: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
        }
    }

    /// Default coordinate readout region: the top-right corner of the window.
    pub fn default_readout_region(&self) -> Rect {
        let width = COORDINATE_READOUT_WIDTH.min(self.window.width);
        Rect::new(
            self.window.width - width,
            0,
            width,
            COORDINATE_READOUT_HEIGHT.min(self.window.height),
        )
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ApiError::invalid_input_with_suggestion(
                format!(
                    "Window size {}x{} is empty",
                    self.window.width, self.window.height
                ),
                "Pass the game window size with --window-size WIDTH,HEIGHT",
            ));
        }
        if !self.ignore_radius.is_finite() || self.ignore_radius < 0.0 {
            return Err(ApiError::invalid_input_with_suggestion(
                format!("Ignore radius {} is not a valid distance", self.ignore_radius),
                "Use a non-negative pixel distance, e.g. --ignore-radius 130",
            ));
        }
        if self.idle_poll.is_zero() {
            return Err(ApiError::invalid_input(
                "Idle poll interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Check that a window-space region is non-empty and inside the window.
pub fn validate_region(name: &str, region: &Rect, window: &WindowGeometry) -> Result<(), ApiError> {
    let inside = u64::from(region.x) + u64::from(region.width) <= u64::from(window.width)
        && u64::from(region.y) + u64::from(region.height) <= u64::from(window.height);
    if region.is_empty() || !inside {
        return Err(ApiError::invalid_input_with_suggestion(
            format!(
                "{} region {},{},{},{} does not fit a {}x{} window",
                name, region.x, region.y, region.width, region.height, window.width, window.height
            ),
            "Regions are X,Y,WIDTH,HEIGHT in window pixels and must be non-empty",
        ));
    }
    Ok(())
}

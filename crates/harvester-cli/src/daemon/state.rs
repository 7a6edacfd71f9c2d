//! Shared controller state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use harvester_core::geometry::Point;
use harvester_core::phase::Phase;
use harvester_core::snapshot::ControllerStatus;

/// The latest detection results, read as one consistent snapshot.
#[derive(Debug, Clone, Default)]
pub struct Detections {
    pub targets: Vec<Point>,
    pub screenshot: Option<Arc<RgbaImage>>,
}

struct ControllerState {
    phase: Phase,
    /// Monotonic entry time, drives warm-up timing.
    phase_entered: Instant,
    /// Wall-clock entry time, for status reports.
    phase_entered_at: DateTime<Utc>,
    targets: Vec<Point>,
    screenshot: Option<Arc<RgbaImage>>,
    click_history: Vec<Point>,
}

/// State shared between detection producers and the controller loop.
///
/// Every read and write goes through one lock, so a reader never sees a
/// target list from one update paired with a screenshot from another.
pub struct SharedState {
    inner: Mutex<ControllerState>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControllerState {
                phase: Phase::Initializing,
                phase_entered: Instant::now(),
                phase_entered_at: Utc::now(),
                targets: Vec::new(),
                screenshot: None,
                click_history: Vec::new(),
            }),
        }
    }

    /// Replace the target list (producer side).
    pub async fn update_targets(&self, targets: Vec<Point>) {
        let mut state = self.inner.lock().await;
        debug!("Targets updated: {} -> {}", state.targets.len(), targets.len());
        state.targets = targets;
    }

    /// Replace the latest screenshot (producer side).
    pub async fn update_screenshot(&self, screenshot: RgbaImage) {
        let screenshot = Arc::new(screenshot);
        let mut state = self.inner.lock().await;
        debug!(
            "Screenshot updated: {}x{}",
            screenshot.width(),
            screenshot.height()
        );
        state.screenshot = Some(screenshot);
    }

    /// Targets and screenshot as of the same instant.
    pub async fn detections(&self) -> Detections {
        let state = self.inner.lock().await;
        Detections {
            targets: state.targets.clone(),
            screenshot: state.screenshot.clone(),
        }
    }

    pub async fn screenshot(&self) -> Option<Arc<RgbaImage>> {
        self.inner.lock().await.screenshot.clone()
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.phase
    }

    /// Time spent in the current phase.
    pub async fn phase_elapsed(&self) -> Duration {
        self.inner.lock().await.phase_entered.elapsed()
    }

    /// Unconditionally enter `phase`, restarting its clock.
    pub async fn reset_phase(&self, phase: Phase) {
        let mut state = self.inner.lock().await;
        enter(&mut state, phase);
    }

    /// Move from `from` to `to` if `from` is still the current phase.
    ///
    /// Returns whether the transition happened.
    pub async fn transition(&self, from: Phase, to: Phase) -> bool {
        let mut state = self.inner.lock().await;
        if state.phase != from {
            return false;
        }
        info!("Phase {} -> {}", from, to);
        enter(&mut state, to);
        true
    }

    /// Append a clicked target to the history.
    pub async fn record_click(&self, target: Point) {
        self.inner.lock().await.click_history.push(target);
    }

    pub async fn click_count(&self) -> usize {
        self.inner.lock().await.click_history.len()
    }

    /// The most recent `limit` clicks (all when `None`), oldest first,
    /// together with the total count.
    pub async fn recent_clicks(&self, limit: Option<usize>) -> (usize, Vec<Point>) {
        let state = self.inner.lock().await;
        let total = state.click_history.len();
        let skip = limit.map_or(0, |n| total.saturating_sub(n));
        (total, state.click_history[skip..].to_vec())
    }

    pub async fn status(&self, running: bool) -> ControllerStatus {
        let state = self.inner.lock().await;
        ControllerStatus {
            running,
            phase: state.phase,
            phase_entered_at: state.phase_entered_at.to_rfc3339(),
            phase_elapsed_ms: u64::try_from(state.phase_entered.elapsed().as_millis())
                .unwrap_or(u64::MAX),
            target_count: state.targets.len(),
            screenshot_size: state
                .screenshot
                .as_ref()
                .map(|s| (s.width(), s.height())),
            clicks: state.click_history.len(),
            last_click: state.click_history.last().copied(),
        }
    }
}

fn enter(state: &mut ControllerState, phase: Phase) {
    state.phase = phase;
    state.phase_entered = Instant::now();
    state.phase_entered_at = Utc::now();
}

//! Input and sensing collaborators driven by the controller.

use anyhow::{Context, Result};
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use harvester_core::geometry::{Point, Rect, WindowGeometry};
use harvester_core::motion::RegionWatcher;

/// Moves and clicks the pointer at absolute screen coordinates.
pub trait Pointer: Send {
    fn move_to(&mut self, pos: Point) -> Result<()>;
    fn click(&mut self) -> Result<()>;
}

/// Reports whether the player moved since the previous check.
pub trait MotionSensor: Send {
    /// `frame` is the latest screenshot pushed by detection, if any.
    fn has_changed(&mut self, frame: Option<&RgbaImage>) -> bool;
}

/// Resumes exploration when no target can be clicked.
pub trait Explorer: Send {
    fn click_random_position(&mut self, pointer: &mut dyn Pointer) -> Result<()>;
}

/// The collaborators owned by a running controller loop.
pub struct Devices {
    pub pointer: Box<dyn Pointer>,
    pub motion: Box<dyn MotionSensor>,
    pub explorer: Box<dyn Explorer>,
}

/// System pointer driven through enigo.
pub struct EnigoPointer {
    enigo: Enigo,
}

impl EnigoPointer {
    pub fn new() -> Result<Self> {
        let enigo =
            Enigo::new(&Settings::default()).context("Failed to connect to the input system")?;
        Ok(Self { enigo })
    }
}

impl Pointer for EnigoPointer {
    fn move_to(&mut self, pos: Point) -> Result<()> {
        self.enigo
            .move_mouse(pos.x, pos.y, Coordinate::Abs)
            .with_context(|| format!("Failed to move pointer to {}", pos))
    }

    fn click(&mut self) -> Result<()> {
        self.enigo
            .button(Button::Left, Direction::Click)
            .context("Failed to click")
    }
}

impl MotionSensor for RegionWatcher {
    fn has_changed(&mut self, frame: Option<&RgbaImage>) -> bool {
        self.observe(frame)
    }
}

/// Clicks random spots on the in-game minimap to walk somewhere new.
pub struct Minimap {
    area: Rect,
    window: WindowGeometry,
    rng: StdRng,
}

impl Minimap {
    /// `area` is the minimap in window space.
    pub fn new(area: Rect, window: WindowGeometry) -> Self {
        Self::with_rng(area, window, StdRng::from_os_rng())
    }

    pub fn with_rng(area: Rect, window: WindowGeometry, rng: StdRng) -> Self {
        Self { area, window, rng }
    }

    fn random_point(&mut self) -> Point {
        let x = self.rng.random_range(self.area.x..self.area.x + self.area.width.max(1));
        let y = self.rng.random_range(self.area.y..self.area.y + self.area.height.max(1));
        Point::new(
            i32::try_from(x).unwrap_or(i32::MAX),
            i32::try_from(y).unwrap_or(i32::MAX),
        )
    }
}

impl Explorer for Minimap {
    fn click_random_position(&mut self, pointer: &mut dyn Pointer) -> Result<()> {
        let point = self.random_point();
        let target = self.window.to_screen(point);
        debug!("Exploring via minimap at {}", target);
        pointer.move_to(target)?;
        pointer.click()
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Recording stand-ins for the real devices.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PointerEvent {
        Move(Point),
        Click,
    }

    #[derive(Clone, Default)]
    pub struct RecordingPointer {
        pub events: Arc<Mutex<Vec<PointerEvent>>>,
    }

    impl RecordingPointer {
        pub fn events(&self) -> Vec<PointerEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn clicks(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| **e == PointerEvent::Click)
                .count()
        }
    }

    impl Pointer for RecordingPointer {
        fn move_to(&mut self, pos: Point) -> Result<()> {
            self.events.lock().unwrap().push(PointerEvent::Move(pos));
            Ok(())
        }

        fn click(&mut self) -> Result<()> {
            self.events.lock().unwrap().push(PointerEvent::Click);
            Ok(())
        }
    }

    /// Pointer whose every operation fails.
    pub struct BrokenPointer;

    impl Pointer for BrokenPointer {
        fn move_to(&mut self, _pos: Point) -> Result<()> {
            anyhow::bail!("pointer unplugged")
        }

        fn click(&mut self) -> Result<()> {
            anyhow::bail!("pointer unplugged")
        }
    }

    /// Replays scripted answers, then repeats `fallback`.
    #[derive(Clone)]
    pub struct ScriptedMotion {
        pub answers: Arc<Mutex<VecDeque<bool>>>,
        pub fallback: bool,
        pub checks: Arc<Mutex<usize>>,
    }

    impl ScriptedMotion {
        pub fn new(answers: &[bool], fallback: bool) -> Self {
            Self {
                answers: Arc::new(Mutex::new(answers.iter().copied().collect())),
                fallback,
                checks: Arc::default(),
            }
        }

        pub fn checks(&self) -> usize {
            *self.checks.lock().unwrap()
        }
    }

    impl MotionSensor for ScriptedMotion {
        fn has_changed(&mut self, _frame: Option<&RgbaImage>) -> bool {
            *self.checks.lock().unwrap() += 1;
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback)
        }
    }

    #[derive(Clone, Default)]
    pub struct CountingExplorer {
        pub calls: Arc<Mutex<usize>>,
    }

    impl CountingExplorer {
        pub fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl Explorer for CountingExplorer {
        fn click_random_position(&mut self, _pointer: &mut dyn Pointer) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }
    }
}

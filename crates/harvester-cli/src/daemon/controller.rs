//! The controller loop: picks targets, clicks them, and tracks the phase.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use harvester_core::config::ControllerConfig;
use harvester_core::error::ApiError;
use harvester_core::phase::Phase;
use harvester_core::selector::TargetSelector;

use crate::daemon::devices::Devices;
use crate::daemon::state::SharedState;
use crate::daemon::stop::StopSignal;

/// Drives the pointer through the Initializing → Searching → Collecting cycle.
///
/// Detection producers write into [`Controller::state`] while the loop
/// started by [`Controller::start`] reads from it. Only one loop runs at a
/// time: it holds the device lock for its whole lifetime.
pub struct Controller {
    config: ControllerConfig,
    selector: TargetSelector,
    state: Arc<SharedState>,
    devices: Mutex<Devices>,
    /// Stop signal of the current loop, `None` before the first start.
    lifecycle: Mutex<Option<StopSignal>>,
}

impl Controller {
    pub fn new(config: ControllerConfig, devices: Devices) -> Self {
        let selector = TargetSelector::for_window(&config.window, config.ignore_radius);
        Self {
            config,
            selector,
            state: Arc::new(SharedState::new()),
            devices: Mutex::new(devices),
            lifecycle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .is_some_and(|stop| !stop.is_raised())
    }

    /// Spawn the controller loop.
    ///
    /// The loop begins in `Initializing` and stays there for the warm-up
    /// period before it starts clicking.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, ApiError> {
        let mut current = self.lifecycle.lock().await;
        if current.as_ref().is_some_and(|stop| !stop.is_raised()) {
            return Err(ApiError::already_running());
        }
        let stop = StopSignal::new();
        *current = Some(stop.clone());
        drop(current);

        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move { controller.run(stop).await }))
    }

    /// Ask the running loop to stop.
    ///
    /// Returns `false` if no loop was running.
    pub async fn stop(&self) -> bool {
        match self.lifecycle.lock().await.as_ref() {
            Some(stop) if !stop.is_raised() => {
                stop.raise();
                true
            }
            _ => false,
        }
    }

    /// Stop the loop and wait until it has released the devices.
    pub async fn shutdown(&self) {
        self.stop().await;
        drop(self.devices.lock().await);
    }

    async fn run(self: Arc<Self>, stop: StopSignal) {
        // Waits for a previous loop, if any, to release the devices.
        let mut devices = self.devices.lock().await;
        self.state.reset_phase(Phase::Initializing).await;
        info!(
            "Controller started, warming up for {:?}",
            self.config.warmup
        );

        while !stop.is_raised() {
            if let Err(e) = self.tick(&mut devices, &stop).await {
                error!("Controller tick failed: {:#}", e);
                stop.sleep(self.config.error_backoff).await;
            }
        }

        info!("Controller stopped");
    }

    /// Run one iteration of the state machine.
    pub(crate) async fn tick(&self, devices: &mut Devices, stop: &StopSignal) -> Result<()> {
        match self.state.phase().await {
            Phase::Initializing => {
                let elapsed = self.state.phase_elapsed().await;
                if elapsed >= self.config.warmup {
                    self.state
                        .transition(Phase::Initializing, Phase::Searching)
                        .await;
                } else {
                    let remaining = self.config.warmup - elapsed;
                    stop.sleep(remaining.min(self.config.idle_poll)).await;
                }
            }
            Phase::Searching => self.search(devices, stop).await?,
            Phase::Collecting => {
                if !stop.sleep(self.config.collect_poll).await {
                    return Ok(());
                }
                if self.is_moving(devices).await {
                    debug!("Still moving, collecting");
                } else {
                    self.state
                        .transition(Phase::Collecting, Phase::Searching)
                        .await;
                }
            }
            Phase::Attacking => {
                stop.sleep(self.config.idle_poll).await;
            }
        }
        Ok(())
    }

    async fn search(&self, devices: &mut Devices, stop: &StopSignal) -> Result<()> {
        let mut clicked = self.click_next_target(devices, stop).await?;
        if !clicked {
            if !stop.sleep(self.config.retry_pause).await {
                return Ok(());
            }
            clicked = self.click_next_target(devices, stop).await?;
        }

        if clicked {
            self.state
                .transition(Phase::Searching, Phase::Collecting)
                .await;
            return Ok(());
        }

        if !stop.sleep(self.config.fallback_wait).await {
            return Ok(());
        }
        if self.is_moving(devices).await {
            debug!("No target clicked but still moving, searching again");
            return Ok(());
        }

        if self.click_next_target(devices, stop).await? {
            self.state
                .transition(Phase::Searching, Phase::Collecting)
                .await;
        } else if !stop.is_raised() {
            warn!("No reachable targets, exploring");
            let Devices {
                pointer, explorer, ..
            } = devices;
            explorer.click_random_position(pointer.as_mut())?;
        }
        Ok(())
    }

    /// Click the nearest target outside the ignore radius.
    ///
    /// Returns `Ok(false)` when no candidate exists or the stop signal
    /// intervened before the click.
    pub(crate) async fn click_next_target(
        &self,
        devices: &mut Devices,
        stop: &StopSignal,
    ) -> Result<bool> {
        let detections = self.state.detections().await;
        let candidates = self.selector.order(&detections.targets);

        // Without tooltip verification the settle delay is the only check,
        // so the nearest candidate is always accepted.
        let Some(&target) = candidates.first() else {
            debug!("No targets outside the ignore radius");
            return Ok(false);
        };
        if stop.is_raised() {
            return Ok(false);
        }

        let screen = self.config.window.to_screen(target);
        debug!("Moving pointer to {}", screen);
        devices.pointer.move_to(screen)?;
        if !stop.sleep(self.config.settle_delay).await {
            return Ok(false);
        }

        devices.pointer.click()?;
        self.state.record_click(target).await;
        info!("Clicked target at {}", screen);
        Ok(true)
    }

    async fn is_moving(&self, devices: &mut Devices) -> bool {
        let frame = self.state.screenshot().await;
        devices.motion.has_changed(frame.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use harvester_core::error::ErrorCode;
    use harvester_core::geometry::{Point, WindowGeometry};
    use tokio::time::Instant;

    use super::*;
    use crate::daemon::devices::fakes::{
        BrokenPointer, CountingExplorer, PointerEvent, RecordingPointer, ScriptedMotion,
    };

    struct Rig {
        controller: Arc<Controller>,
        pointer: RecordingPointer,
        motion: ScriptedMotion,
        explorer: CountingExplorer,
    }

    fn config() -> ControllerConfig {
        ControllerConfig::new(WindowGeometry {
            offset: Point::new(10, 20),
            width: 800,
            height: 600,
        })
    }

    fn rig(motion: ScriptedMotion) -> Rig {
        let pointer = RecordingPointer::default();
        let explorer = CountingExplorer::default();
        let devices = Devices {
            pointer: Box::new(pointer.clone()),
            motion: Box::new(motion.clone()),
            explorer: Box::new(explorer.clone()),
        };
        Rig {
            controller: Arc::new(Controller::new(config(), devices)),
            pointer,
            motion,
            explorer,
        }
    }

    async fn enter_searching(controller: &Controller) {
        controller
            .state()
            .transition(Phase::Initializing, Phase::Searching)
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_targets_fail_without_moving_pointer() {
        let rig = rig(ScriptedMotion::new(&[], false));
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        let clicked = rig
            .controller
            .click_next_target(&mut devices, &stop)
            .await
            .unwrap();

        assert!(!clicked);
        assert!(rig.pointer.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn targets_inside_radius_are_never_clicked() {
        let rig = rig(ScriptedMotion::new(&[], false));
        // Centre is (400, 300); both are within 130px.
        rig.controller
            .state()
            .update_targets(vec![Point::new(410, 300), Point::new(400, 200)])
            .await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        assert!(!rig
            .controller
            .click_next_target(&mut devices, &stop)
            .await
            .unwrap());
        assert!(rig.pointer.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn raised_stop_prevents_any_click() {
        let rig = rig(ScriptedMotion::new(&[], false));
        rig.controller
            .state()
            .update_targets(vec![Point::new(700, 300)])
            .await;
        let stop = StopSignal::new();
        stop.raise();
        let mut devices = rig.controller.devices.lock().await;

        let clicked = rig
            .controller
            .click_next_target(&mut devices, &stop)
            .await
            .unwrap();

        assert!(!clicked);
        assert_eq!(rig.pointer.clicks(), 0);
        assert!(rig.pointer.events().is_empty());
        assert_eq!(rig.controller.state().click_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_settle_delay_skips_click() {
        let rig = rig(ScriptedMotion::new(&[], false));
        rig.controller
            .state()
            .update_targets(vec![Point::new(700, 300)])
            .await;
        let stop = StopSignal::new();
        let raiser = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            raiser.raise();
        });
        let mut devices = rig.controller.devices.lock().await;

        let clicked = rig
            .controller
            .click_next_target(&mut devices, &stop)
            .await
            .unwrap();

        assert!(!clicked);
        assert_eq!(
            rig.pointer.events(),
            vec![PointerEvent::Move(Point::new(710, 320))]
        );
        assert_eq!(rig.controller.state().click_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clicks_nearest_target_in_screen_space() {
        let rig = rig(ScriptedMotion::new(&[], false));
        rig.controller
            .state()
            .update_targets(vec![
                Point::new(700, 300),
                Point::new(410, 300),
                Point::new(600, 300),
            ])
            .await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        let started = Instant::now();
        let clicked = rig
            .controller
            .click_next_target(&mut devices, &stop)
            .await
            .unwrap();

        assert!(clicked);
        assert!(started.elapsed() >= Duration::from_millis(1250));
        assert_eq!(
            rig.pointer.events(),
            vec![
                PointerEvent::Move(Point::new(610, 320)),
                PointerEvent::Click
            ]
        );
        let (total, history) = rig.controller.state().recent_clicks(None).await;
        assert_eq!(total, 1);
        assert_eq!(history, vec![Point::new(600, 300)]);
    }

    #[tokio::test(start_paused = true)]
    async fn history_grows_by_one_per_click() {
        let rig = rig(ScriptedMotion::new(&[], false));
        rig.controller
            .state()
            .update_targets(vec![Point::new(700, 300)])
            .await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        for expected in 1..=3 {
            assert!(rig
                .controller
                .click_next_target(&mut devices, &stop)
                .await
                .unwrap());
            assert_eq!(rig.controller.state().click_count().await, expected);
        }
        assert_eq!(rig.pointer.clicks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_transitions_to_searching_once() {
        let rig = rig(ScriptedMotion::new(&[], true));
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;
        rig.controller.state().reset_phase(Phase::Initializing).await;

        let started = Instant::now();
        while rig.controller.state().phase().await == Phase::Initializing {
            rig.controller.tick(&mut devices, &stop).await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_millis(6200));
        assert_eq!(rig.controller.state().phase().await, Phase::Searching);

        // Later ticks never re-enter the warm-up.
        for _ in 0..3 {
            rig.controller.tick(&mut devices, &stop).await.unwrap();
            assert_ne!(rig.controller.state().phase().await, Phase::Initializing);
        }
        assert!(!rig
            .controller
            .state()
            .transition(Phase::Initializing, Phase::Searching)
            .await);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_search_enters_collecting() {
        let rig = rig(ScriptedMotion::new(&[], false));
        enter_searching(&rig.controller).await;
        rig.controller
            .state()
            .update_targets(vec![Point::new(100, 100)])
            .await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        rig.controller.tick(&mut devices, &stop).await.unwrap();

        assert_eq!(rig.controller.state().phase().await, Phase::Collecting);
        assert_eq!(rig.pointer.clicks(), 1);
        assert_eq!(rig.explorer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn collecting_holds_while_moving() {
        let rig = rig(ScriptedMotion::new(&[true, true, true], false));
        enter_searching(&rig.controller).await;
        rig.controller
            .state()
            .transition(Phase::Searching, Phase::Collecting)
            .await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        for _ in 0..3 {
            rig.controller.tick(&mut devices, &stop).await.unwrap();
            assert_eq!(rig.controller.state().phase().await, Phase::Collecting);
        }
        rig.controller.tick(&mut devices, &stop).await.unwrap();

        assert_eq!(rig.controller.state().phase().await, Phase::Searching);
        assert_eq!(rig.motion.checks(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_search_explores_when_idle() {
        let rig = rig(ScriptedMotion::new(&[], false));
        enter_searching(&rig.controller).await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        let started = Instant::now();
        rig.controller.tick(&mut devices, &stop).await.unwrap();

        // 1s retry pause + 3s fallback wait.
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(rig.explorer.calls(), 1);
        assert_eq!(rig.motion.checks(), 1);
        assert_eq!(rig.controller.state().phase().await, Phase::Searching);
    }

    #[tokio::test(start_paused = true)]
    async fn targets_arriving_during_fallback_wait_are_clicked() {
        let rig = rig(ScriptedMotion::new(&[], false));
        enter_searching(&rig.controller).await;
        let state = Arc::clone(rig.controller.state());
        tokio::spawn(async move {
            // Inside the 3s fallback wait that follows the 1s retry pause.
            tokio::time::sleep(Duration::from_millis(2500)).await;
            state.update_targets(vec![Point::new(50, 50)]).await;
        });
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        rig.controller.tick(&mut devices, &stop).await.unwrap();

        assert_eq!(rig.controller.state().phase().await, Phase::Collecting);
        assert_eq!(rig.pointer.clicks(), 1);
        assert_eq!(rig.motion.checks(), 1);
        assert_eq!(rig.explorer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_search_while_moving_waits() {
        let rig = rig(ScriptedMotion::new(&[], true));
        enter_searching(&rig.controller).await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        rig.controller.tick(&mut devices, &stop).await.unwrap();

        assert_eq!(rig.explorer.calls(), 0);
        assert!(rig.pointer.events().is_empty());
        assert_eq!(rig.controller.state().phase().await, Phase::Searching);
    }

    #[tokio::test(start_paused = true)]
    async fn targets_arriving_during_retry_pause_are_clicked() {
        let rig = rig(ScriptedMotion::new(&[], false));
        enter_searching(&rig.controller).await;
        let state = Arc::clone(rig.controller.state());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            state.update_targets(vec![Point::new(50, 50)]).await;
        });
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        rig.controller.tick(&mut devices, &stop).await.unwrap();

        assert_eq!(rig.controller.state().phase().await, Phase::Collecting);
        assert_eq!(rig.pointer.clicks(), 1);
        assert_eq!(rig.explorer.calls(), 0);
        assert_eq!(rig.motion.checks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn attacking_is_inert() {
        let rig = rig(ScriptedMotion::new(&[], false));
        rig.controller.state().reset_phase(Phase::Attacking).await;
        rig.controller
            .state()
            .update_targets(vec![Point::new(50, 50)])
            .await;
        let stop = StopSignal::new();
        let mut devices = rig.controller.devices.lock().await;

        for _ in 0..5 {
            rig.controller.tick(&mut devices, &stop).await.unwrap();
        }

        assert_eq!(rig.controller.state().phase().await, Phase::Attacking);
        assert!(rig.pointer.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn start_stop_lifecycle() {
        let rig = rig(ScriptedMotion::new(&[], false));
        assert!(!rig.controller.is_running().await);
        assert!(!rig.controller.stop().await);

        let handle = rig.controller.start().await.unwrap();
        assert!(rig.controller.is_running().await);
        let err = rig.controller.start().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyRunning);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rig.controller.state().phase().await, Phase::Initializing);

        let stopped_at = Instant::now();
        assert!(rig.controller.stop().await);
        handle.await.unwrap();
        assert!(stopped_at.elapsed() < Duration::from_millis(200));
        assert!(!rig.controller.is_running().await);

        // A fresh start warms up again.
        let handle = rig.controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_ne!(rig.controller.state().phase().await, Phase::Initializing);
        rig.controller.stop().await;
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tick_errors_do_not_end_the_loop() {
        let devices = Devices {
            pointer: Box::new(BrokenPointer),
            motion: Box::new(ScriptedMotion::new(&[], false)),
            explorer: Box::new(CountingExplorer::default()),
        };
        let controller = Arc::new(Controller::new(config(), devices));
        controller
            .state()
            .update_targets(vec![Point::new(50, 50)])
            .await;

        let handle = controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!handle.is_finished());
        assert_eq!(controller.state().phase().await, Phase::Searching);
        assert_eq!(controller.state().click_count().await, 0);

        controller.stop().await;
        handle.await.unwrap();
    }
}

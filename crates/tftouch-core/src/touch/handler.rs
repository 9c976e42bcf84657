//! The touch state machine.
//!
//! # Modes
//!
//! ```text
//! begin ─┬─ stored calibration ──> Offer ──timeout──> Running
//!        │                           │
//!        │                          tap
//!        │                           v
//!        └─ nothing usable ──> CalibrationRequested ──> Calibrating ──> Running
//! ```
//!
//! Only `Running` produces widget events. Every mode is advanced by
//! [`TouchHandler::poll`], nothing here blocks.

use alloc::boxed::Box;

use embassy_time::Instant;
use embedded_graphics::prelude::*;
use log::{debug, error, info, warn};

use super::{Clock, Sampler, TouchSession};
use crate::calibration::{
    Axis, AxisCalibration, Calibration, CalibrationGeometry, CalibrationProgress,
    CalibrationResult, Calibrator, TapOrTimeout, TapOutcome,
};
use crate::config::{CalibratorConfig, TouchConfig};
use crate::storage::{CalibrationRecord, CalibrationStore};
use crate::ui::{EventKind, Screen, Surface, TouchEvent};

/// What [`TouchHandler::poll`] currently does with samples.
pub enum TouchMode {
    /// Normal operation: samples become widget events.
    Running,
    /// A stored calibration is installed; a tap before the deadline
    /// requests a new one.
    Offer(TapOrTimeout),
    /// Calibration starts on the next poll.
    CalibrationRequested,
    Calibrating(Box<Calibrator>),
}

/// Turns raw panel samples into [`TouchEvent`]s on a [`Screen`].
pub struct TouchHandler<S, C, P> {
    sampler: S,
    clock: C,
    store: P,
    config: TouchConfig,
    calibrator_config: CalibratorConfig,
    x_axis: Option<AxisCalibration>,
    y_axis: Option<AxisCalibration>,
    session: TouchSession,
    last_digest: Option<Instant>,
    mode: TouchMode,
}

impl<S, C, P> TouchHandler<S, C, P>
where
    S: Sampler,
    C: Clock,
    P: CalibrationStore,
{
    /// Create an uncalibrated handler. Call [`TouchHandler::begin`] or
    /// [`TouchHandler::set_calibration`] before polling.
    pub fn new(sampler: S, clock: C, store: P) -> Self {
        let now = clock.now();
        Self {
            sampler,
            clock,
            store,
            config: TouchConfig::default(),
            calibrator_config: CalibratorConfig::default(),
            x_axis: None,
            y_axis: None,
            session: TouchSession::new(now),
            last_digest: None,
            mode: TouchMode::Running,
        }
    }

    pub fn with_config(mut self, config: TouchConfig, calibrator_config: CalibratorConfig) -> Self {
        self.config = config;
        self.calibrator_config = calibrator_config;
        self
    }

    pub const fn config(&self) -> &TouchConfig {
        &self.config
    }

    pub const fn session(&self) -> &TouchSession {
        &self.session
    }

    pub const fn mode(&self) -> &TouchMode {
        &self.mode
    }

    pub fn sampler_mut(&mut self) -> &mut S {
        &mut self.sampler
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    pub fn is_calibrated(&self) -> bool {
        self.x_axis.is_some() && self.y_axis.is_some()
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(
            self.mode,
            TouchMode::CalibrationRequested | TouchMode::Calibrating(_)
        )
    }

    pub fn calibration(&self) -> Option<Calibration> {
        Some(Calibration::new(self.x_axis.clone()?, self.y_axis.clone()?))
    }

    /// Install markers for one axis. The direction comes from the
    /// calibrator config. Nothing is persisted.
    pub fn set_calibration(&mut self, axis: Axis, markers: &[u16], spacing: u16) -> CalibrationResult<()> {
        let calibration =
            AxisCalibration::new(markers, spacing, self.calibrator_config.reversed(axis))?;
        match axis {
            Axis::X => self.x_axis = Some(calibration),
            Axis::Y => self.y_axis = Some(calibration),
        }
        Ok(())
    }

    /// Start a fresh calibration on the next poll.
    pub fn begin_calibration(&mut self) {
        info!("Calibration requested");
        self.mode = TouchMode::CalibrationRequested;
    }

    /// Load the stored calibration for this screen.
    ///
    /// A blank or outdated store starts calibration. Otherwise the stored
    /// calibration is used and a tap within the recalibration window
    /// replaces it.
    pub fn begin<D: Surface>(&mut self, screen: &mut Screen<D>) {
        let now = self.clock.now();
        self.reset(now);

        let geometry = CalibrationGeometry::for_panel(
            screen.display().panel_size(),
            self.calibrator_config.cell_size,
        );
        match self.load_calibration(&geometry) {
            Some(calibration) => {
                self.install(calibration);
                let window = self.config.recalibration_window();
                info!(
                    "Loaded stored calibration, tap within {} s to recalibrate",
                    window.as_secs()
                );
                self.mode = TouchMode::Offer(TapOrTimeout::new(now, window));
            }
            None => self.begin_calibration(),
        }
    }

    /// Run one cycle of whatever the handler is currently doing.
    ///
    /// Returns the `Touch`, `Draw` or `Untouch` event the cycle dispatched.
    pub fn poll<D: Surface>(&mut self, screen: &mut Screen<D>) -> Option<TouchEvent> {
        let now = self.clock.now();
        match &mut self.mode {
            TouchMode::Running => {
                if let Some(last) = self.last_digest
                    && now.saturating_duration_since(last) < self.config.digest_interval()
                {
                    return None;
                }
                self.last_digest = Some(now);
                let event = self.digest(screen, now);
                screen.dispatch_next();
                event
            }
            TouchMode::Offer(wait) => {
                let pressed = self.sampler.sample().within(&self.config.pressure).pressed;
                match wait.step(now, pressed) {
                    TapOutcome::Pending => {}
                    TapOutcome::Tapped => self.begin_calibration(),
                    TapOutcome::TimedOut => {
                        debug!("Recalibration window closed");
                        self.reset(now);
                        self.mode = TouchMode::Running;
                    }
                }
                None
            }
            TouchMode::CalibrationRequested => {
                self.start_calibration(screen, now);
                None
            }
            TouchMode::Calibrating(_) => {
                self.step_calibration(screen, now);
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Calibration
    // -----------------------------------------------------------------------

    fn load_calibration(&mut self, geometry: &CalibrationGeometry) -> Option<Calibration> {
        match self.store.is_virgin() {
            Ok(false) => {}
            Ok(true) => {
                info!("Calibration storage is blank");
                return None;
            }
            Err(e) => {
                warn!("Cannot read calibration storage: {}", e);
                return None;
            }
        }

        match self.store.is_calibrated() {
            Ok(true) => {}
            Ok(false) => {
                info!("No valid calibration stored");
                return None;
            }
            Err(e) => {
                warn!("Cannot read calibration flag: {}", e);
                return None;
            }
        }

        let record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("Calibration flag set but no record stored");
                return None;
            }
            Err(e) => {
                warn!("Cannot load calibration: {}", e);
                return None;
            }
        };

        if record.geometry != *geometry {
            info!(
                "Screen geometry changed since last calibration ({:?} -> {:?})",
                record.geometry, geometry
            );
            return None;
        }

        record
            .to_calibration()
            .inspect_err(|e| warn!("Stored calibration is invalid: {}", e))
            .ok()
    }

    fn start_calibration<D: Surface>(&mut self, screen: &mut Screen<D>, now: Instant) {
        let panel = screen.display().panel_size();
        match Calibrator::new(self.calibrator_config, panel, now) {
            Ok(calibrator) => {
                let background = screen.background();
                if let Err(e) = screen.display_mut().clear(background) {
                    warn!("Failed to clear screen for calibration: {:?}", e);
                }
                self.mode = TouchMode::Calibrating(Box::new(calibrator));
            }
            Err(e) => {
                error!("Cannot calibrate this panel: {}", e);
                self.mode = TouchMode::Running;
            }
        }
    }

    fn step_calibration<D: Surface>(&mut self, screen: &mut Screen<D>, now: Instant) {
        let TouchMode::Calibrating(calibrator) = &mut self.mode else {
            return;
        };

        let sample = self.sampler.sample().within(&self.config.pressure);
        let progress = match calibrator.step(now, sample, screen.display_mut()) {
            Ok(progress) => progress,
            Err(e) => {
                warn!("Calibration display failed: {:?}", e);
                return;
            }
        };

        if let CalibrationProgress::Finished(calibration) = progress {
            let geometry = *calibrator.geometry();
            self.persist(geometry, &calibration);
            self.install(calibration);
            self.reset(now);
            self.mode = TouchMode::Running;
            if let Err(e) = screen.redraw_all() {
                warn!("Failed to redraw after calibration: {:?}", e);
            }
        }
    }

    fn persist(&mut self, geometry: CalibrationGeometry, calibration: &Calibration) {
        let record = CalibrationRecord::new(geometry, calibration);
        match self
            .store
            .save(&record)
            .and_then(|()| self.store.set_calibrated(true))
        {
            Ok(()) => info!("Calibration stored"),
            Err(e) => warn!("Failed to store calibration: {}", e),
        }
    }

    fn install(&mut self, calibration: Calibration) {
        self.x_axis = Some(calibration.x);
        self.y_axis = Some(calibration.y);
    }

    fn reset(&mut self, now: Instant) {
        self.session = TouchSession::new(now);
        self.last_digest = None;
    }

    // -----------------------------------------------------------------------
    // Digest
    // -----------------------------------------------------------------------

    fn digest<D: Surface>(&mut self, screen: &mut Screen<D>, now: Instant) -> Option<TouchEvent> {
        let (Some(x_axis), Some(y_axis)) = (&self.x_axis, &self.y_axis) else {
            debug!("Touch panel not calibrated, ignoring input");
            return None;
        };

        // Presses outside the pressure band count as released.
        let sample = self.sampler.sample().within(&self.config.pressure);
        let point = if sample.pressed {
            let panel = Point::new(
                x_axis.normalize(sample.x) as i32,
                y_axis.normalize(sample.y) as i32,
            );
            let display = screen.display();
            display.rotation().panel_to_logical(panel, display.size())
        } else {
            self.session.point
        };

        let root = screen.root();
        match (self.session.pressed, sample.pressed) {
            (false, false) => {
                let idle = now.saturating_duration_since(self.session.timestamp);
                if screen.is_awake() && idle > self.config.inactivity_timeout() {
                    info!("No touch for {} s", idle.as_secs());
                    screen.dispatch(TouchEvent::targeted(EventKind::GotoSleep, now, root));
                }
                return None;
            }
            (false, true) if !screen.is_awake() => {
                screen.dispatch(TouchEvent::targeted(EventKind::WakeUp, now, root));
                self.session.timestamp = now;
                return None;
            }
            (true, true) if self.is_jitter(point) => return None,
            _ => {}
        }

        self.session.save_state();
        self.session.pressed = sample.pressed;
        self.session.timestamp = now;

        if sample.pressed {
            self.session.point = point;
            Some(self.press(screen, now))
        } else {
            self.release(screen, now)
        }
    }

    fn is_jitter(&self, point: Point) -> bool {
        let threshold = self.config.jitter_threshold as i32;
        let delta = point - self.session.point;
        delta.x.abs() <= threshold && delta.y.abs() <= threshold
    }

    fn press<D: Surface>(&mut self, screen: &mut Screen<D>, now: Instant) -> TouchEvent {
        let point = self.session.point;
        let source = screen.match_widget(point);

        if source != self.session.source {
            if let Some(old) = self.session.source {
                screen.dispatch(TouchEvent::new(EventKind::OutOfScope, now, point, Some(old)));
            }
            if let Some(new) = source {
                screen.dispatch(TouchEvent::new(EventKind::InScope, now, point, Some(new)));
            }
            self.session.source = source;
        }

        let kind = if self.session.previous_pressed {
            EventKind::Draw
        } else {
            EventKind::Touch
        };
        self.session.kind = kind;

        let event = TouchEvent::new(kind, now, point, source);
        screen.dispatch(event);
        event
    }

    /// End the press session. `session.pressed` is only ever set by
    /// [`Self::press`], so the session being released always saw a `Touch`
    /// or `Draw`.
    fn release<D: Surface>(&mut self, screen: &mut Screen<D>, now: Instant) -> Option<TouchEvent> {
        self.session.kind = EventKind::Untouch;
        self.session.source = None;

        let id = self.session.previous_source?;
        let point = self.session.previous_point;
        let event = TouchEvent::new(EventKind::Untouch, now, point, Some(id));
        screen.dispatch(event);
        screen.dispatch(TouchEvent::new(EventKind::OutOfScope, now, point, Some(id)));
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PressureWindow;
    use crate::framebuffer::FrameBuffer;
    use crate::geometry::{Area, Rotation};
    use crate::storage::{RamStorage, SLOT_SIZE, SlotStore};
    use crate::touch::RawSample;
    use crate::ui::{EventContext, Widget, WidgetId};
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    /// Raw markers for a 100 px axis where raw = pixel + 100.
    const LINEAR: [u16; 6] = [100, 120, 140, 160, 180, 200];

    struct Script(RawSample);

    impl Sampler for Script {
        fn sample(&mut self) -> RawSample {
            self.0
        }
    }

    struct ManualClock(u64);

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            Instant::from_millis(self.0)
        }
    }

    type Store = SlotStore<RamStorage<SLOT_SIZE>>;
    type Handler = TouchHandler<Script, ManualClock, Store>;
    type Log = Rc<RefCell<Vec<(&'static str, EventKind)>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl<D: Surface> Widget<D> for Recorder {
        fn on_event(&mut self, _cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
            self.log.borrow_mut().push((self.name, event.kind));
        }
    }

    fn calibrator_config() -> CalibratorConfig {
        CalibratorConfig {
            y_reversed: false,
            touches_per_marker: 1,
            samples_per_touch: 1,
            touch_pause_ms: 0,
            marker_pause_ms: 0,
            error_flash_ms: 0,
            ..CalibratorConfig::default()
        }
    }

    fn handler(store: Store) -> Handler {
        TouchHandler::new(Script(RawSample::released()), ManualClock(0), store)
            .with_config(TouchConfig::default(), calibrator_config())
    }

    fn linear() -> Calibration {
        Calibration::new(
            AxisCalibration::new(&LINEAR, 20, false).unwrap(),
            AxisCalibration::new(&LINEAR, 20, false).unwrap(),
        )
    }

    fn stored(panel: Size) -> Store {
        let mut store = SlotStore::new(RamStorage::new(), 0);
        let geometry = CalibrationGeometry::for_panel(panel, 20);
        store.save(&CalibrationRecord::new(geometry, &linear())).unwrap();
        store.set_calibrated(true).unwrap();
        store
    }

    fn press(x: u16, y: u16) -> RawSample {
        RawSample::pressed(x + 100, y + 100, 500)
    }

    /// 100x100 screen split into a left and a right half.
    struct Rig {
        handler: Handler,
        screen: Screen<FrameBuffer>,
        log: Log,
        left: WidgetId,
        right: WidgetId,
    }

    impl Rig {
        fn new() -> Self {
            let mut rig = Self::with_store(SlotStore::new(RamStorage::new(), 0));
            rig.handler.set_calibration(Axis::X, &LINEAR, 20).unwrap();
            rig.handler.set_calibration(Axis::Y, &LINEAR, 20).unwrap();
            rig
        }

        fn with_store(store: Store) -> Self {
            Self::build(FrameBuffer::new(Size::new(100, 100)), store)
        }

        fn rotated(rotation: Rotation) -> Self {
            let mut rig = Self::build(
                FrameBuffer::new(Size::new(100, 100)).with_rotation(rotation),
                SlotStore::new(RamStorage::new(), 0),
            );
            rig.handler.set_calibration(Axis::X, &LINEAR, 20).unwrap();
            rig.handler.set_calibration(Axis::Y, &LINEAR, 20).unwrap();
            rig
        }

        fn build(display: FrameBuffer, store: Store) -> Self {
            let mut screen = Screen::new(display);
            let log = Log::default();
            let left = screen.insert(
                Area::new(0, 0, 50, 100),
                Recorder {
                    name: "left",
                    log: log.clone(),
                },
            );
            let right = screen.insert(
                Area::new(50, 0, 50, 100),
                Recorder {
                    name: "right",
                    log: log.clone(),
                },
            );
            let root = screen.root();
            screen.add_child(root, left).unwrap();
            screen.add_child(root, right).unwrap();

            Self {
                handler: handler(store),
                screen,
                log,
                left,
                right,
            }
        }

        fn poll(&mut self, ms: u64, sample: RawSample) -> Option<TouchEvent> {
            self.handler.clock_mut().0 = ms;
            self.handler.sampler_mut().0 = sample;
            self.handler.poll(&mut self.screen)
        }

        fn log(&self) -> Vec<(&'static str, EventKind)> {
            self.log.borrow().clone()
        }
    }

    #[test]
    fn test_press_drag_release_sequence() {
        let mut rig = Rig::new();

        let event = rig.poll(0, press(10, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Touch);
        assert_eq!(event.source, Some(rig.left));
        assert_eq!(event.point, Point::new(10, 10));

        let event = rig.poll(100, press(70, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Draw);
        assert_eq!(event.source, Some(rig.right));

        let event = rig.poll(200, RawSample::released()).unwrap();
        assert_eq!(event.kind, EventKind::Untouch);
        assert_eq!(event.source, Some(rig.right));
        assert_eq!(event.point, Point::new(70, 10));

        assert_eq!(
            rig.log(),
            [
                ("left", EventKind::InScope),
                ("left", EventKind::Touch),
                ("left", EventKind::OutOfScope),
                ("right", EventKind::InScope),
                ("right", EventKind::Draw),
                ("right", EventKind::Untouch),
                ("right", EventKind::OutOfScope),
            ]
        );
        assert_eq!(rig.handler.session().source, None);
    }

    #[test]
    fn test_jitter_is_ignored_while_pressed() {
        let mut rig = Rig::new();
        rig.poll(0, press(10, 10));
        assert_eq!(rig.poll(100, press(15, 5)), None);
        assert_eq!(rig.poll(200, press(10, 15)), None);
        assert_eq!(rig.handler.session().point, Point::new(10, 10));

        let event = rig.poll(300, press(16, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Draw);
        assert_eq!(rig.handler.session().previous_point, Point::new(10, 10));
    }

    #[test]
    fn test_small_press_after_release_is_a_touch() {
        let mut rig = Rig::new();
        rig.poll(0, press(10, 10));
        rig.poll(100, RawSample::released());
        // Same spot again: press transitions are never filtered.
        let event = rig.poll(200, press(11, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Touch);
    }

    #[test]
    fn test_rate_limit() {
        let mut rig = Rig::new();
        rig.poll(0, press(10, 10));
        assert_eq!(rig.poll(50, press(70, 10)), None);
        assert_eq!(rig.log().len(), 2);

        let event = rig.poll(100, press(70, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Draw);
    }

    #[test]
    fn test_inactivity_sleep_and_wake() {
        let mut rig = Rig::new();
        rig.poll(0, RawSample::released());
        assert!(rig.screen.is_awake());
        rig.poll(300_000, RawSample::released());
        assert!(rig.screen.is_awake());

        rig.poll(300_100, RawSample::released());
        assert!(!rig.screen.is_awake());

        // Only the waking sample is dropped.
        assert_eq!(rig.poll(300_200, press(10, 10)), None);
        assert!(rig.screen.is_awake());
        assert!(rig.log().is_empty());
        assert!(!rig.handler.session().pressed);

        let event = rig.poll(300_300, press(10, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Touch);
        assert_eq!(event.source, Some(rig.left));
        assert_eq!(
            rig.log(),
            [("left", EventKind::InScope), ("left", EventKind::Touch)]
        );
    }

    #[test]
    fn test_press_held_across_wake_drags() {
        let mut rig = Rig::new();
        rig.poll(0, RawSample::released());
        rig.poll(300_100, RawSample::released());
        assert!(!rig.screen.is_awake());

        assert_eq!(rig.poll(300_200, press(10, 10)), None);
        let event = rig.poll(300_300, press(12, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Touch);
        let event = rig.poll(300_400, press(70, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Draw);
        assert_eq!(event.source, Some(rig.right));

        let event = rig.poll(300_500, RawSample::released()).unwrap();
        assert_eq!(event.kind, EventKind::Untouch);
    }

    #[test]
    fn test_press_is_rotated_before_hit_testing() {
        let mut rig = Rig::rotated(Rotation::Deg90);
        // Panel (70, 10) is logical (10, 29): the left half, not the right.
        let event = rig.poll(0, press(70, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Touch);
        assert_eq!(event.point, Point::new(10, 29));
        assert_eq!(event.source, Some(rig.left));

        let event = rig.poll(100, press(20, 10)).unwrap();
        assert_eq!(event.point, Point::new(10, 79));
        assert_eq!(event.source, Some(rig.left));

        // Panel (10, 70) is logical (70, 89).
        let event = rig.poll(200, press(10, 70)).unwrap();
        assert_eq!(event.point, Point::new(70, 89));
        assert_eq!(event.source, Some(rig.right));
    }

    #[test]
    fn test_release_without_source_dispatches_nothing() {
        let mut screen = Screen::new(FrameBuffer::new(Size::new(60, 60)));
        let log = Log::default();
        let sink = log.clone();
        screen.set_unsolicited_handler(move |event| {
            sink.borrow_mut().push(("unsolicited", event.kind));
        });

        let mut handler = handler(SlotStore::new(RamStorage::new(), 0));
        handler.set_calibration(Axis::X, &LINEAR, 20).unwrap();
        handler.set_calibration(Axis::Y, &LINEAR, 20).unwrap();

        // x = 90 is off the 60 px screen.
        handler.sampler_mut().0 = press(90, 10);
        let event = handler.poll(&mut screen).unwrap();
        assert_eq!((event.kind, event.source), (EventKind::Touch, None));

        handler.clock_mut().0 = 100;
        handler.sampler_mut().0 = RawSample::released();
        assert_eq!(handler.poll(&mut screen), None);
        assert!(!handler.session().pressed);
        assert_eq!(log.borrow().as_slice(), [("unsolicited", EventKind::Touch)]);
    }

    #[test]
    fn test_pressure_outside_window_is_released() {
        let mut rig = Rig::new();
        assert_eq!(rig.poll(0, RawSample::pressed(110, 110, 100)), None);
        assert!(rig.log().is_empty());

        rig.poll(100, press(10, 10));
        let event = rig.poll(200, RawSample::pressed(110, 110, 1_200)).unwrap();
        assert_eq!(event.kind, EventKind::Untouch);

        let config = TouchConfig {
            pressure: PressureWindow { min: 600, max: 1_000 },
            ..TouchConfig::default()
        };
        rig.handler = TouchHandler::new(
            Script(RawSample::released()),
            ManualClock(0),
            SlotStore::new(RamStorage::new(), 0),
        )
        .with_config(config, calibrator_config());
        rig.handler.set_calibration(Axis::X, &LINEAR, 20).unwrap();
        rig.handler.set_calibration(Axis::Y, &LINEAR, 20).unwrap();
        assert_eq!(rig.poll(300, press(10, 10)), None);
    }

    #[test]
    fn test_begin_mid_press_drops_the_release() {
        let mut rig = Rig::with_store(stored(Size::new(100, 100)));
        rig.handler.begin(&mut rig.screen);
        rig.poll(6_000, RawSample::released());
        assert!(matches!(rig.handler.mode(), TouchMode::Running));
        assert_eq!(rig.poll(6_100, press(10, 10)).unwrap().kind, EventKind::Touch);

        rig.handler.clock_mut().0 = 6_150;
        rig.handler.begin(&mut rig.screen);
        assert!(!rig.handler.session().pressed);
        rig.poll(12_150, RawSample::released());
        assert!(matches!(rig.handler.mode(), TouchMode::Running));

        assert_eq!(rig.poll(12_250, RawSample::released()), None);
        assert_eq!(
            rig.log(),
            [("left", EventKind::InScope), ("left", EventKind::Touch)]
        );
    }

    #[test]
    fn test_one_deferred_event_per_poll() {
        let mut rig = Rig::new();
        for _ in 0..2 {
            let event = TouchEvent::targeted(EventKind::Custom(1), Instant::from_millis(0), rig.left);
            rig.screen.dispatch_later(event).unwrap();
        }

        rig.poll(0, RawSample::released());
        assert_eq!(rig.screen.pending_events(), 1);
        rig.poll(100, RawSample::released());
        assert_eq!(rig.screen.pending_events(), 0);
        assert_eq!(
            rig.log(),
            [("left", EventKind::Custom(1)), ("left", EventKind::Custom(1))]
        );
    }

    #[test]
    fn test_uncalibrated_input_is_ignored() {
        let mut rig = Rig::with_store(SlotStore::new(RamStorage::new(), 0));
        assert!(!rig.handler.is_calibrated());
        assert_eq!(rig.poll(0, press(10, 10)), None);
        assert!(rig.log().is_empty());
    }

    #[test]
    fn test_set_calibration_rejects_bad_markers() {
        let mut rig = Rig::with_store(SlotStore::new(RamStorage::new(), 0));
        assert!(rig.handler.set_calibration(Axis::X, &[100], 20).is_err());
        assert!(rig.handler.set_calibration(Axis::X, &[200, 100], 20).is_err());
        rig.handler.set_calibration(Axis::X, &LINEAR, 20).unwrap();
        assert!(!rig.handler.is_calibrated());
        rig.handler.set_calibration(Axis::Y, &LINEAR, 20).unwrap();
        assert_eq!(rig.handler.calibration(), Some(linear()));
    }

    #[test]
    fn test_begin_with_blank_store_calibrates() {
        let mut rig = Rig::with_store(SlotStore::new(RamStorage::new(), 0));
        rig.handler.begin(&mut rig.screen);
        assert!(matches!(rig.handler.mode(), TouchMode::CalibrationRequested));

        rig.poll(0, RawSample::released());
        assert!(matches!(rig.handler.mode(), TouchMode::Calibrating(_)));
    }

    #[test]
    fn test_begin_with_stored_calibration_offers_recalibration() {
        let mut rig = Rig::with_store(stored(Size::new(100, 100)));
        rig.handler.begin(&mut rig.screen);
        assert!(matches!(rig.handler.mode(), TouchMode::Offer(_)));
        assert_eq!(rig.handler.calibration(), Some(linear()));

        // No widget events while the window is open.
        assert_eq!(rig.poll(0, press(10, 10)), None);
        assert_eq!(rig.poll(3_000, RawSample::released()), None);
        rig.poll(6_000, RawSample::released());
        assert!(matches!(rig.handler.mode(), TouchMode::Running));
        assert!(rig.log().is_empty());

        let event = rig.poll(6_100, press(10, 10)).unwrap();
        assert_eq!(event.kind, EventKind::Touch);
    }

    #[test]
    fn test_tap_in_window_requests_calibration() {
        let mut rig = Rig::with_store(stored(Size::new(100, 100)));
        rig.handler.begin(&mut rig.screen);
        rig.poll(100, RawSample::released());
        rig.poll(200, press(10, 10));
        assert!(rig.handler.is_calibrating());
    }

    #[test]
    fn test_geometry_change_invalidates_stored_calibration() {
        let mut rig = Rig::with_store(stored(Size::new(200, 100)));
        rig.handler.begin(&mut rig.screen);
        assert!(matches!(rig.handler.mode(), TouchMode::CalibrationRequested));
        assert!(!rig.handler.is_calibrated());
    }

    #[test]
    fn test_cleared_flag_calibrates() {
        let mut store = stored(Size::new(100, 100));
        store.set_calibrated(false).unwrap();
        let mut rig = Rig::with_store(store);
        rig.handler.begin(&mut rig.screen);
        assert!(rig.handler.is_calibrating());
    }

    #[test]
    fn test_calibration_run_is_installed_and_stored() {
        // 40x40 panel: three markers per axis.
        let mut screen = Screen::new(FrameBuffer::new(Size::new(40, 40)));
        let mut handler = handler(SlotStore::new(RamStorage::new(), 0));
        handler.begin(&mut screen);

        let mut clock = 0;
        let mut poll = |handler: &mut Handler, sample: RawSample| {
            handler.clock_mut().0 = clock;
            handler.sampler_mut().0 = sample;
            clock += 10;
            handler.poll(&mut screen);
        };

        poll(&mut handler, RawSample::released());
        for raw in [100, 200, 300, 110, 210, 310] {
            poll(&mut handler, RawSample::released());
            poll(&mut handler, RawSample::pressed(raw, raw, 500));
            poll(&mut handler, RawSample::released());
        }

        assert!(matches!(handler.mode(), TouchMode::Running));
        let calibration = handler.calibration().unwrap();
        assert_eq!(calibration.x.markers(), [100, 200, 300]);
        assert_eq!(calibration.y.markers(), [110, 210, 310]);

        let store = handler.store_mut();
        assert!(store.is_calibrated().unwrap());
        let record = store.load().unwrap().unwrap();
        assert_eq!(record.geometry, CalibrationGeometry::for_panel(Size::new(40, 40), 20));
        assert_eq!(record.to_calibration().unwrap(), calibration);
    }
}

//! Desktop simulator for the tftouch widget toolkit.
//!
//! Renders a small demo screen in an SDL2 window via `embedded-graphics-simulator`.
//! The mouse stands in for the resistive panel: [`PanelSampler`] turns the
//! pointer into raw plate readings, so calibration, normalization and the
//! touch state machine all run exactly as they would on hardware.
//!
//! The window shows the panel in its native orientation. With a rotation
//! set, the UI appears turned inside it, as on a rotated physical display.
//!
//! # Key bindings
//!
//! | Key | Action       |
//! |-----|--------------|
//! | C   | Recalibrate  |
//! | Q   | Quit         |
//!
//! # Environment
//!
//! | Variable              | Effect                                      |
//! |-----------------------|---------------------------------------------|
//! | `TFTOUCH_ROTATION`    | Quarter turns of the logical screen, 0-3    |
//! | `TFTOUCH_BLANK_STORE` | Start with blank storage, calibrating first |

mod widgets;

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embedded_graphics::pixelcolor::{Rgb565, WebColors};
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{
    OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window, sdl2::Keycode,
};
use log::{debug, info, warn};

use tftouch_core::calibration::CalibrationGeometry;
use tftouch_core::storage::{CalibrationRecord, SLOT_SIZE};
use tftouch_core::ui::TreeResult;
use tftouch_core::{
    Area, Axis, AxisCalibration, Calibration, CalibrationStore, CalibratorConfig, FrameBuffer,
    PressureWindow, RamStorage, RawSample, Rotation, Sampler, Screen, SlotStore, SystemClock,
    TouchConfig, TouchHandler,
};

use widgets::{Button, Counter, Panel, SketchPad};

// ---------------------------------------------------------------------------
// Display constants
// ---------------------------------------------------------------------------

const PANEL_WIDTH: u32 = 320;
const PANEL_HEIGHT: u32 = 240;

/// Pixel scale factor for the simulator window.
const WINDOW_SCALE: u32 = 2;

/// Poll period of the main loop.
const TICK: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Synthetic resistive panel
// ---------------------------------------------------------------------------

/// Raw reading at pixel 0.
const RAW_OFFSET: u16 = 100;
const RAW_PER_PIXEL: u16 = 3;
/// Pressure reported while the mouse button is held.
const PRESSURE: u16 = 500;

type Store = SlotStore<RamStorage<SLOT_SIZE>>;

/// Mouse-driven stand-in for the panel's analog front end.
struct PanelSampler {
    pointer: Rc<Cell<Option<Point>>>,
    panel: Size,
    pressure: PressureWindow,
    ticks: u16,
}

impl PanelSampler {
    fn new(pointer: Rc<Cell<Option<Point>>>, panel: Size, pressure: PressureWindow) -> Self {
        Self {
            pointer,
            panel,
            pressure,
            ticks: 0,
        }
    }

    /// Plate readings for a panel pixel. The Y plate is wired bottom to top.
    fn raw(panel: Size, point: Point) -> (u16, u16) {
        let x = point.x.clamp(0, panel.width as i32 - 1) as u16;
        let y = point.y.clamp(0, panel.height as i32 - 1) as u16;
        let flipped = panel.height as u16 - 1 - y;
        (
            RAW_OFFSET + x * RAW_PER_PIXEL,
            RAW_OFFSET + flipped * RAW_PER_PIXEL,
        )
    }
}

impl Sampler for PanelSampler {
    fn sample(&mut self) -> RawSample {
        self.ticks = self.ticks.wrapping_add(1);
        match self.pointer.get() {
            Some(point) => {
                let (x, y) = Self::raw(self.panel, point);
                // A little ADC noise, well below one pixel.
                let noise = self.ticks % 3;
                RawSample::from_pressure(x + noise, y + noise, PRESSURE, &self.pressure)
            }
            None => RawSample::from_pressure(0, 0, 0, &self.pressure),
        }
    }
}

/// Store the calibration a perfect run on [`PanelSampler`] would produce,
/// so the demo starts without the calibration procedure.
fn seed_calibration(store: &mut Store, panel: Size, config: &CalibratorConfig) {
    let geometry = CalibrationGeometry::for_panel(panel, config.cell_size);
    let cell = geometry.cell_size;

    let markers = |axis: Axis| -> Vec<u16> {
        let count = geometry.markers(axis);
        let last = geometry.extent(axis).saturating_sub(1);
        (0..count)
            .map(|index| {
                let along = if config.reversed(axis) {
                    (count - 1 - index) * cell
                } else {
                    index * cell
                };
                let along = along.min(last) as i32;
                let point = match axis {
                    Axis::X => Point::new(along, 0),
                    Axis::Y => Point::new(0, along),
                };
                let (x, y) = PanelSampler::raw(panel, point);
                axis.pick(x, y)
            })
            .collect()
    };
    let axis = |axis: Axis| AxisCalibration::new(&markers(axis), cell, config.reversed(axis));

    let calibration = match (axis(Axis::X), axis(Axis::Y)) {
        (Ok(x), Ok(y)) => Calibration::new(x, y),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot build factory calibration: {}", e);
            return;
        }
    };

    let record = CalibrationRecord::new(geometry, &calibration);
    match store
        .save(&record)
        .and_then(|()| store.set_calibrated(true))
    {
        Ok(()) => info!("Storage seeded with factory calibration"),
        Err(e) => warn!("Failed to seed storage: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Demo screen
// ---------------------------------------------------------------------------

/// Sketch pad on top, a row of two buttons and a click counter below.
fn build_demo(screen: &mut Screen<FrameBuffer>) -> TreeResult<()> {
    const MARGIN: u32 = 8;
    const ROW_HEIGHT: u32 = 40;

    let size = screen.display().size();
    let root = screen.root();

    let background = screen.insert(
        Area::new(0, 0, size.width, size.height),
        Panel::new(Rgb565::CSS_MIDNIGHT_BLUE),
    );
    screen.add_child(root, background)?;

    let pad = screen.insert(
        Area::new(
            MARGIN as i32,
            MARGIN as i32,
            size.width - 2 * MARGIN,
            size.height - ROW_HEIGHT - 3 * MARGIN,
        ),
        SketchPad::new(Rgb565::CSS_ORANGE),
    );
    screen.add_child(background, pad)?;

    let column = (size.width - 4 * MARGIN) / 3;
    let row_y = (size.height - ROW_HEIGHT - MARGIN) as i32;
    let slot = |index: u32| {
        Area::new(
            (MARGIN + index * (column + MARGIN)) as i32,
            row_y,
            column,
            ROW_HEIGHT,
        )
    };

    let counter = screen.insert(
        Area::new(0, 0, column, ROW_HEIGHT / 2).centered_in(&slot(2)),
        Counter::default(),
    );
    let clear = screen.insert(slot(0), Button::new("Clear", Rgb565::CSS_DARK_RED, pad));
    let count = screen.insert(slot(1), Button::new("Count", Rgb565::CSS_DARK_GREEN, counter));
    for child in [clear, count, counter] {
        screen.add_child(background, child)?;
    }
    Ok(())
}

fn rotation_from_env() -> Rotation {
    std::env::var("TFTOUCH_ROTATION")
        .ok()
        .and_then(|value| value.parse::<u8>().ok())
        .map(Rotation::from_index)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let panel = Size::new(PANEL_WIDTH, PANEL_HEIGHT);
    let rotation = rotation_from_env();
    info!("Starting tftouch simulator");
    info!(
        "Panel: {}x{} (scale {}x), rotation {:?}",
        PANEL_WIDTH, PANEL_HEIGHT, WINDOW_SCALE, rotation
    );
    info!("Keys: C=Recalibrate  Q=Quit");

    let mut window_display = SimulatorDisplay::<Rgb565>::new(panel);
    let output_settings = OutputSettingsBuilder::new().scale(WINDOW_SCALE).build();
    let mut window = Window::new("tftouch Simulator", &output_settings);

    let mut screen = Screen::new(FrameBuffer::new(panel).with_rotation(rotation));
    if let Err(e) = build_demo(&mut screen) {
        log::error!("Failed to build demo screen: {}", e);
        return;
    }
    screen.set_unsolicited_handler(|event| debug!("Unsolicited {:?} at {:?}", event.kind, event.point));

    let touch_config = TouchConfig::default();
    let calibrator_config = CalibratorConfig::default();
    let mut store = SlotStore::new(RamStorage::new(), 0);
    if std::env::var_os("TFTOUCH_BLANK_STORE").is_none() {
        seed_calibration(&mut store, panel, &calibrator_config);
    }

    let pointer = Rc::new(Cell::new(None));
    let sampler = PanelSampler::new(pointer.clone(), panel, touch_config.pressure);
    let mut touch =
        TouchHandler::new(sampler, SystemClock, store).with_config(touch_config, calibrator_config);

    let _ = screen.redraw_all();
    touch.begin(&mut screen);

    // The SDL window is lazily initialized on the first `update()` call.
    // We must call `update()` once before `events()` or it will panic.
    let _ = screen.display_mut().flush(&mut window_display);
    window.update(&window_display);

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    'running: loop {
        let tick_start = Instant::now();

        for event in window.events() {
            match event {
                SimulatorEvent::Quit => break 'running,
                SimulatorEvent::KeyDown { keycode, .. } => match keycode {
                    Keycode::Q | Keycode::Escape => break 'running,
                    Keycode::C => touch.begin_calibration(),
                    _ => {}
                },
                SimulatorEvent::MouseButtonDown { point, .. } => pointer.set(Some(point)),
                SimulatorEvent::MouseButtonUp { .. } => pointer.set(None),
                SimulatorEvent::MouseMove { point } if pointer.get().is_some() => {
                    pointer.set(Some(point));
                }
                _ => {}
            }
        }

        if let Some(event) = touch.poll(&mut screen) {
            debug!("{:?} at {:?} on {:?}", event.kind, event.point, event.source);
        }

        let _ = screen.display_mut().flush(&mut window_display);
        window.update(&window_display);

        let elapsed = tick_start.elapsed();
        if elapsed < TICK {
            std::thread::sleep(TICK - elapsed);
        }
    }

    info!("Simulator exiting");
}

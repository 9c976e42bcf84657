//! Touch input: raw samples in, semantic events out.
//!
//! The board provides a [`Sampler`] (the resistive panel glue, including its
//! short-dip debouncing) and a [`Clock`]. [`TouchHandler`] turns their output
//! into [`TouchEvent`](crate::ui::TouchEvent)s dispatched on a
//! [`Screen`](crate::ui::Screen).

mod handler;
mod session;

pub use handler::{TouchHandler, TouchMode};
pub use session::TouchSession;

use embassy_time::Instant;

use crate::config::PressureWindow;

/// One reading of the touch panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub pressed: bool,
    pub x: u16,
    pub y: u16,
    pub pressure: u16,
}

impl RawSample {
    pub const fn pressed(x: u16, y: u16, pressure: u16) -> Self {
        Self {
            pressed: true,
            x,
            y,
            pressure,
        }
    }

    pub const fn released() -> Self {
        Self {
            pressed: false,
            x: 0,
            y: 0,
            pressure: 0,
        }
    }

    /// Build a sample from a pressure reading, for panels without a separate
    /// touch-detect line.
    pub const fn from_pressure(x: u16, y: u16, pressure: u16, window: &PressureWindow) -> Self {
        Self {
            pressed: window.contains(pressure),
            x,
            y,
            pressure,
        }
    }

    /// The same reading, released if its pressure is outside `window`.
    pub const fn within(self, window: &PressureWindow) -> Self {
        Self {
            pressed: self.pressed && window.contains(self.pressure),
            ..self
        }
    }
}

/// Source of raw touch readings, polled once per tick.
pub trait Sampler {
    fn sample(&mut self) -> RawSample;
}

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

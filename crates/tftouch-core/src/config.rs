//! Tunables for the touch pipeline and the calibration procedure.
//!
//! Both structs are plain serde data so a board crate can ship them in a
//! config blob; the `Default` impls carry the values used on the reference
//! hardware.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::calibration::Axis;

/// Pressure band that counts as a press, both bounds exclusive.
///
/// Resistive panels report garbage pressure when barely touched and when the
/// reading saturates, so only the band in between is trusted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureWindow {
    pub min: u16,
    pub max: u16,
}

impl PressureWindow {
    pub const fn contains(&self, pressure: u16) -> bool {
        pressure > self.min && pressure < self.max
    }
}

impl Default for PressureWindow {
    fn default() -> Self {
        Self { min: 200, max: 1000 }
    }
}

/// Settings for [`TouchHandler`](crate::touch::TouchHandler).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchConfig {
    /// Pressed-to-pressed moves at or below this many pixels on both axes are dropped.
    pub jitter_threshold: u16,
    /// Minimum time between two processed digest cycles.
    pub digest_interval_ms: u64,
    /// Idle time after which the screen is put to sleep.
    pub inactivity_timeout_ms: u64,
    /// How long a tap at startup may request recalibration.
    pub recalibration_window_ms: u64,
    pub pressure: PressureWindow,
}

impl TouchConfig {
    pub const fn digest_interval(&self) -> Duration {
        Duration::from_millis(self.digest_interval_ms)
    }

    pub const fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub const fn recalibration_window(&self) -> Duration {
        Duration::from_millis(self.recalibration_window_ms)
    }
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            jitter_threshold: 5,
            digest_interval_ms: 100,
            inactivity_timeout_ms: 300_000,
            recalibration_window_ms: 6_000,
            pressure: PressureWindow::default(),
        }
    }
}

/// Settings for the guided calibration procedure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibratorConfig {
    /// Pixel distance between two markers on either axis.
    pub cell_size: u16,
    pub touches_per_marker: u8,
    /// Largest accepted difference between the touches of one marker, in raw units.
    pub max_spread: u16,
    /// Readings averaged into one touch while the panel stays pressed.
    pub samples_per_touch: u8,
    pub sample_interval_ms: u64,
    /// Pause after a touch is captured before the next one is accepted.
    pub touch_pause_ms: u64,
    /// Pause after a marker is accepted before the next one is shown.
    pub marker_pause_ms: u64,
    /// How long a rejected marker flashes before it is retried.
    pub error_flash_ms: u64,
    /// Markers on the X axis are captured from the right edge leftwards.
    pub x_reversed: bool,
    /// Markers on the Y axis are captured from the bottom edge upwards.
    pub y_reversed: bool,
}

impl CalibratorConfig {
    pub const fn reversed(&self, axis: Axis) -> bool {
        match axis {
            Axis::X => self.x_reversed,
            Axis::Y => self.y_reversed,
        }
    }

    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub const fn touch_pause(&self) -> Duration {
        Duration::from_millis(self.touch_pause_ms)
    }

    pub const fn marker_pause(&self) -> Duration {
        Duration::from_millis(self.marker_pause_ms)
    }

    pub const fn error_flash(&self) -> Duration {
        Duration::from_millis(self.error_flash_ms)
    }
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            cell_size: 20,
            touches_per_marker: 3,
            max_spread: 10,
            samples_per_touch: 20,
            sample_interval_ms: 50,
            touch_pause_ms: 500,
            marker_pause_ms: 1_000,
            error_flash_ms: 1_000,
            x_reversed: false,
            y_reversed: true,
        }
    }
}

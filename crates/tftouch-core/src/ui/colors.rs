//! Colors shared by the screen and the calibration overlay.

use embedded_graphics::pixelcolor::{Rgb565, RgbColor};

pub const BACKGROUND: Rgb565 = Rgb565::BLACK;

/// Marker waiting for a touch.
pub const MARKER_IDLE: Rgb565 = Rgb565::RED;
/// Marker being sampled.
pub const MARKER_ACTIVE: Rgb565 = Rgb565::WHITE;
pub const MARKER_REJECTED: Rgb565 = Rgb565::BLUE;

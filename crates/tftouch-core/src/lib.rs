//! Hardware-independent core library for tftouch
//!
//! This crate contains all platform-agnostic logic of the toolkit: touch
//! calibration and coordinate normalization, the touch state machine, the
//! widget tree with its hit-testing, and the event dispatcher with its
//! deferred queue.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).
//!
//! # Pipeline
//!
//! ```text
//! Sampler -> Calibration -> TouchHandler -> Screen::dispatch -> Widget hooks
//!                                  |
//!                                  +-> Screen::match_widget
//! ```

#![no_std]

extern crate alloc;

pub mod calibration;
pub mod config;
pub mod framebuffer;
pub mod geometry;
pub mod storage;
pub mod touch;
pub mod ui;

pub use calibration::{Axis, AxisCalibration, Calibration, CalibrationError};
pub use config::{CalibratorConfig, PressureWindow, TouchConfig};
pub use framebuffer::FrameBuffer;
pub use geometry::{Area, Rotation};
pub use storage::{CalibrationStore, RamStorage, SlotStore, StorageError};
pub use touch::{Clock, RawSample, Sampler, SystemClock, TouchHandler, TouchMode};
pub use ui::{EventContext, EventKind, Screen, Surface, TouchEvent, Widget, WidgetId};

//! Guided calibration procedure.
//!
//! The operator is shown one marker cross at a time and touches it
//! `touches_per_marker` times. Each touch averages the readings taken while
//! the panel stays pressed. A marker is accepted when its touches agree and
//! its value continues the increasing sequence of its axis; otherwise it
//! flashes blue and is retried from scratch.
//!
//! X markers run along the horizontal center line, Y markers along the
//! vertical one. The procedure never blocks: [`Calibrator::step`] is called
//! once per scheduler tick with a fresh sample and the current time.

use embassy_time::Instant;
use embedded_graphics::Drawable;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle};
use log::{debug, info, warn};

use super::{
    Axis, AxisCalibration, Calibration, CalibrationError, CalibrationGeometry, CalibrationResult,
    MAX_MARKERS, Markers,
};
use crate::config::CalibratorConfig;
use crate::touch::RawSample;
use crate::ui::Surface;
use crate::ui::colors;

/// Most touches a single marker can require.
pub const MAX_TOUCHES: usize = 8;

/// Result of one calibration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationProgress {
    Running,
    /// Returned exactly once, by the step that accepted the last marker.
    Finished(Calibration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the panel to be released and `until` to pass.
    Release { until: Instant },
    AwaitPress,
    Sampling { next_at: Instant },
    /// Showing a rejected marker.
    Flash { until: Instant },
    /// Marker accepted, pausing before the next one.
    Pause { until: Instant },
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: u32,
    count: u8,
}

impl Accumulator {
    fn add(&mut self, value: u16) {
        self.sum += value as u32;
        self.count += 1;
    }

    fn average(&self) -> Option<u16> {
        (self.count > 0).then(|| (self.sum / self.count as u32) as u16)
    }
}

pub struct Calibrator {
    config: CalibratorConfig,
    geometry: CalibrationGeometry,
    axis: Axis,
    marker: u16,
    phase: Phase,
    reading: Accumulator,
    touches: heapless::Vec<u16, MAX_TOUCHES>,
    x_markers: Markers,
    y_markers: Markers,
}

impl Calibrator {
    /// Prepare a calibration run for a panel of the given native size.
    ///
    /// The first marker is only shown once the panel is released, so the tap
    /// that requested calibration does not count as a touch.
    pub fn new(config: CalibratorConfig, panel: Size, now: Instant) -> CalibrationResult<Self> {
        let geometry = CalibrationGeometry::for_panel(panel, config.cell_size);
        for axis in [Axis::X, Axis::Y] {
            let count = geometry.markers(axis) as usize;
            if count > MAX_MARKERS {
                return Err(CalibrationError::TooManyMarkers(count));
            }
        }

        let mut config = config;
        config.touches_per_marker = config.touches_per_marker.clamp(1, MAX_TOUCHES as u8);
        config.samples_per_touch = config.samples_per_touch.max(1);

        info!(
            "Calibrating {}x{} panel: {} X markers, {} Y markers",
            geometry.width, geometry.height, geometry.x_markers, geometry.y_markers
        );

        Ok(Self {
            config,
            geometry,
            axis: Axis::X,
            marker: 0,
            phase: Phase::Release { until: now },
            reading: Accumulator::default(),
            touches: heapless::Vec::new(),
            x_markers: Markers::new(),
            y_markers: Markers::new(),
        })
    }

    pub const fn geometry(&self) -> &CalibrationGeometry {
        &self.geometry
    }

    /// Axis and index of the marker currently being captured.
    pub const fn current_marker(&self) -> (Axis, u16) {
        (self.axis, self.marker)
    }

    /// Touches already accepted for the current marker.
    pub fn touches_taken(&self) -> usize {
        self.touches.len()
    }

    pub fn captured(&self, axis: Axis) -> &[u16] {
        match axis {
            Axis::X => &self.x_markers,
            Axis::Y => &self.y_markers,
        }
    }

    pub const fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Advance the procedure by one tick.
    pub fn step<D: Surface>(
        &mut self,
        now: Instant,
        sample: RawSample,
        display: &mut D,
    ) -> Result<CalibrationProgress, D::Error> {
        match self.phase {
            Phase::Release { until } => {
                if !sample.pressed && now >= until {
                    debug!(
                        "Showing {:?} marker {}/{}",
                        self.axis,
                        self.marker + 1,
                        self.geometry.markers(self.axis)
                    );
                    self.draw_marker(display, colors::MARKER_IDLE)?;
                    self.phase = Phase::AwaitPress;
                }
            }
            Phase::AwaitPress => {
                if sample.pressed {
                    self.reading = Accumulator::default();
                    self.draw_marker(display, colors::MARKER_ACTIVE)?;
                    self.phase = Phase::Sampling { next_at: now };
                    self.take_reading(now, sample, display)?;
                }
            }
            Phase::Sampling { next_at } => {
                if !sample.pressed {
                    self.finish_touch(now, display)?;
                } else if now >= next_at {
                    self.take_reading(now, sample, display)?;
                }
            }
            Phase::Flash { until } => {
                if now >= until {
                    self.phase = Phase::Release { until: now };
                }
            }
            Phase::Pause { until } => {
                if now >= until {
                    return self.next_marker(now, display);
                }
            }
            Phase::Done => {}
        }
        Ok(CalibrationProgress::Running)
    }

    fn take_reading<D: Surface>(
        &mut self,
        now: Instant,
        sample: RawSample,
        display: &mut D,
    ) -> Result<(), D::Error> {
        let value = self.axis.pick(sample.x, sample.y);
        if value == 0 {
            warn!("{}, retrying touch", CalibrationError::ZeroReading);
            self.reading = Accumulator::default();
            self.draw_marker(display, colors::MARKER_IDLE)?;
            self.phase = Phase::Release {
                until: now + self.config.touch_pause(),
            };
            return Ok(());
        }

        self.reading.add(value);
        if self.reading.count >= self.config.samples_per_touch {
            self.finish_touch(now, display)
        } else {
            self.phase = Phase::Sampling {
                next_at: now + self.config.sample_interval(),
            };
            Ok(())
        }
    }

    fn finish_touch<D: Surface>(&mut self, now: Instant, display: &mut D) -> Result<(), D::Error> {
        let Some(value) = self.reading.average() else {
            self.phase = Phase::Release { until: now };
            return Ok(());
        };
        self.reading = Accumulator::default();
        // Capacity is clamped in `new`, so this cannot overflow.
        let _ = self.touches.push(value);
        debug!(
            "Touch {}/{} for {:?} marker {}: {}",
            self.touches.len(),
            self.config.touches_per_marker,
            self.axis,
            self.marker,
            value
        );

        if self.touches.len() < self.config.touches_per_marker as usize {
            self.phase = Phase::Release {
                until: now + self.config.touch_pause(),
            };
            return Ok(());
        }

        match self.evaluate_marker() {
            Ok(value) => {
                info!("{:?} marker {} accepted: {}", self.axis, self.marker, value);
                let markers = match self.axis {
                    Axis::X => &mut self.x_markers,
                    Axis::Y => &mut self.y_markers,
                };
                let _ = markers.push(value);
                self.touches.clear();
                self.phase = Phase::Pause {
                    until: now + self.config.marker_pause(),
                };
                Ok(())
            }
            Err(e) => {
                warn!("{:?} marker {} rejected: {}", self.axis, self.marker, e);
                self.touches.clear();
                self.draw_marker(display, colors::MARKER_REJECTED)?;
                self.phase = Phase::Flash {
                    until: now + self.config.error_flash(),
                };
                Ok(())
            }
        }
    }

    /// Average the touches of the current marker, rejecting spread or order violations.
    fn evaluate_marker(&self) -> CalibrationResult<u16> {
        let min = self.touches.iter().copied().min().unwrap_or(0);
        let max = self.touches.iter().copied().max().unwrap_or(0);
        let spread = max - min;
        if spread > self.config.max_spread {
            return Err(CalibrationError::SpreadTooWide {
                spread,
                limit: self.config.max_spread,
            });
        }

        let sum: u32 = self.touches.iter().map(|&t| t as u32).sum();
        let value = (sum / self.touches.len().max(1) as u32) as u16;
        if let Some(&previous) = self.captured(self.axis).last()
            && value <= previous
        {
            return Err(CalibrationError::OutOfOrder { value, previous });
        }
        Ok(value)
    }

    fn next_marker<D: Surface>(
        &mut self,
        now: Instant,
        display: &mut D,
    ) -> Result<CalibrationProgress, D::Error> {
        self.draw_marker(display, colors::BACKGROUND)?;
        self.marker += 1;
        self.phase = Phase::Release { until: now };

        if self.marker < self.geometry.markers(self.axis) {
            return Ok(CalibrationProgress::Running);
        }
        if self.axis == Axis::X {
            self.axis = Axis::Y;
            self.marker = 0;
            return Ok(CalibrationProgress::Running);
        }

        match self.build() {
            Ok(calibration) => {
                info!("Calibration complete");
                self.phase = Phase::Done;
                Ok(CalibrationProgress::Finished(calibration))
            }
            Err(e) => {
                warn!("Captured markers are unusable ({}), starting over", e);
                self.axis = Axis::X;
                self.marker = 0;
                self.x_markers.clear();
                self.y_markers.clear();
                Ok(CalibrationProgress::Running)
            }
        }
    }

    fn build(&self) -> CalibrationResult<Calibration> {
        let cell = self.geometry.cell_size;
        Ok(Calibration::new(
            AxisCalibration::new(&self.x_markers, cell, self.config.x_reversed)?,
            AxisCalibration::new(&self.y_markers, cell, self.config.y_reversed)?,
        ))
    }

    /// Center of the current marker in native panel coordinates.
    fn marker_position(&self) -> Point {
        let cell = self.geometry.cell_size as i32;
        let count = self.geometry.markers(self.axis) as i32;
        let extent = self.geometry.extent(self.axis) as i32;
        let index = self.marker as i32;

        let along = if self.config.reversed(self.axis) {
            (count - 1 - index) * cell
        } else {
            index * cell
        };
        let along = along.clamp(0, (extent - 1).max(0));

        match self.axis {
            Axis::X => Point::new(along, self.geometry.height as i32 / 2),
            Axis::Y => Point::new(self.geometry.width as i32 / 2, along),
        }
    }

    fn draw_marker<D: Surface>(&self, display: &mut D, color: Rgb565) -> Result<(), D::Error> {
        let center = display
            .rotation()
            .panel_to_logical(self.marker_position(), display.size());
        let half = ((self.geometry.cell_size as i32 * 4 / 5) | 1) / 2;
        let style = PrimitiveStyle::with_stroke(color, 1);

        Line::new(center - Point::new(half, 0), center + Point::new(half, 0))
            .into_styled(style)
            .draw(display)?;
        Line::new(center - Point::new(0, half), center + Point::new(0, half))
            .into_styled(style)
            .draw(display)?;
        Ok(())
    }
}

//! Touch calibration model and coordinate normalization.
//!
//! A resistive panel reports raw readings that are neither linear nor
//! aligned with the display. Calibration captures, per axis, the raw reading
//! at evenly spaced grid lines ("markers"). Normalizing a raw reading then
//! means finding the two markers around it and interpolating linearly
//! between their pixel positions.
//!
//! # Layout
//!
//! ```text
//! raw:      m[0]      m[1]      m[2]   ...   m[n-1]
//!            |---------|---------|---  ...  ---|
//! pixel:     0      spacing   2*spacing     spacing*(n-1)-1 (clamped)
//! ```
//!
//! Markers are stored in capture order and must strictly increase. An axis
//! captured from its far end is flagged `reversed`, its pixel positions are
//! mirrored after interpolation.

pub mod calibrator;
pub mod tap;

pub use calibrator::{CalibrationProgress, Calibrator};
pub use tap::{TapOrTimeout, TapOutcome};

use embedded_graphics::prelude::{Point, Size};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Upper bound on markers per axis (a 640 px axis at 20 px cells).
pub const MAX_MARKERS: usize = 33;

pub type Markers = heapless::Vec<u16, MAX_MARKERS>;

/// Errors raised while building or capturing a calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("an axis needs at least two markers, got {0}")]
    TooFewMarkers(usize),

    #[error("too many markers for one axis: {0}")]
    TooManyMarkers(usize),

    #[error("marker spacing must be at least one pixel")]
    ZeroSpacing,

    #[error("marker {index} ({value}) is not above its predecessor")]
    NotIncreasing { index: usize, value: u16 },

    #[error("touches for one marker spread {spread} raw units, limit is {limit}")]
    SpreadTooWide { spread: u16, limit: u16 },

    #[error("marker reading {value} is not above the previous marker {previous}")]
    OutOfOrder { value: u16, previous: u16 },

    #[error("panel returned a zero reading while pressed")]
    ZeroReading,
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// The component of a raw or pixel pair that belongs to this axis.
    pub const fn pick(self, x: u16, y: u16) -> u16 {
        match self {
            Axis::X => x,
            Axis::Y => y,
        }
    }
}

/// Panel geometry a calibration was captured for.
///
/// A stored calibration is only valid while this is unchanged; a different
/// panel, cell size or marker count invalidates it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationGeometry {
    pub width: u16,
    pub height: u16,
    pub cell_size: u16,
    pub x_markers: u16,
    pub y_markers: u16,
}

impl CalibrationGeometry {
    /// Geometry for a panel of the given native size.
    pub fn for_panel(panel: Size, cell_size: u16) -> Self {
        let width = panel.width.min(u16::MAX as u32) as u16;
        let height = panel.height.min(u16::MAX as u32) as u16;
        let cell = cell_size.max(1);
        Self {
            width,
            height,
            cell_size: cell,
            x_markers: width / cell + 1,
            y_markers: height / cell + 1,
        }
    }

    pub const fn markers(&self, axis: Axis) -> u16 {
        match axis {
            Axis::X => self.x_markers,
            Axis::Y => self.y_markers,
        }
    }

    pub const fn extent(&self, axis: Axis) -> u16 {
        match axis {
            Axis::X => self.width,
            Axis::Y => self.height,
        }
    }
}

/// Map a raw reading onto pixels using one axis' markers.
///
/// `markers` must be non-decreasing with at least two entries; fewer than two
/// yields 0. Readings at or below the first marker give 0, at or above the
/// last marker give `spacing * (n - 1) - 1`. In between the nearest marker is
/// estimated from the average marker distance, corrected by a short linear
/// scan, and the position inside the bracketing cell is interpolated with
/// rounding. The result never exceeds the top clamp, so the mapping stays
/// monotonic. A zero-width cell maps to its base pixel.
pub fn normalize_axis(raw: u16, markers: &[u16], spacing: u16) -> u16 {
    let n = markers.len();
    if n < 2 {
        return 0;
    }
    let last = n - 1;
    let max = (spacing as u32 * last as u32)
        .saturating_sub(1)
        .min(u16::MAX as u32);

    let first = markers[0];
    let top = markers[last];
    if raw <= first {
        return 0;
    }
    if raw >= top {
        return max as u16;
    }

    // round((raw - first) / ((top - first) / (n - 1))) in integers
    let span = (top - first) as u32;
    let offset = (raw - first) as u32;
    let mut index = ((2 * offset * last as u32 + span) / (2 * span)) as usize;

    if index >= n {
        return max as u16;
    }
    if markers[index] != raw {
        if markers[index] <= raw {
            while index < n && markers[index] <= raw {
                index += 1;
            }
            index -= 1;
        } else {
            while index > 0 && markers[index] > raw {
                index -= 1;
            }
        }
    }
    if index >= last {
        return max as u16;
    }

    let low = markers[index] as u32;
    let high = markers[index + 1] as u32;
    let base = spacing as u32 * index as u32;
    if high <= low {
        return base.min(max) as u16;
    }

    let width = high - low;
    let within = (2 * spacing as u32 * (raw as u32 - low) + width) / (2 * width);
    (base + within).min(max) as u16
}

/// Calibration of a single axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisCalibration {
    markers: Markers,
    spacing: u16,
    reversed: bool,
}

impl AxisCalibration {
    /// Validate and copy a marker sequence.
    pub fn new(markers: &[u16], spacing: u16, reversed: bool) -> CalibrationResult<Self> {
        if markers.len() < 2 {
            return Err(CalibrationError::TooFewMarkers(markers.len()));
        }
        if spacing == 0 {
            return Err(CalibrationError::ZeroSpacing);
        }
        if let Some(index) = markers.windows(2).position(|pair| pair[1] <= pair[0]) {
            return Err(CalibrationError::NotIncreasing {
                index: index + 1,
                value: markers[index + 1],
            });
        }
        let markers = Markers::from_slice(markers)
            .map_err(|_| CalibrationError::TooManyMarkers(markers.len()))?;

        Ok(Self {
            markers,
            spacing,
            reversed,
        })
    }

    pub fn markers(&self) -> &[u16] {
        &self.markers
    }

    pub const fn spacing(&self) -> u16 {
        self.spacing
    }

    pub const fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Pixel length covered by the markers.
    pub fn extent(&self) -> u16 {
        (self.spacing as u32 * (self.markers.len() as u32 - 1)).min(u16::MAX as u32) as u16
    }

    /// Pixel position of a raw reading along this axis, in capture direction
    /// resolved to panel direction.
    pub fn normalize(&self, raw: u16) -> u16 {
        let pixel = normalize_axis(raw, &self.markers, self.spacing);
        if self.reversed {
            let extent = self.extent();
            extent.saturating_sub(pixel).min(extent.saturating_sub(1))
        } else {
            pixel
        }
    }
}

/// Both axes of a panel calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
}

impl Calibration {
    pub const fn new(x: AxisCalibration, y: AxisCalibration) -> Self {
        Self { x, y }
    }

    pub const fn axis(&self, axis: Axis) -> &AxisCalibration {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }

    pub fn set_axis(&mut self, axis: Axis, calibration: AxisCalibration) {
        match axis {
            Axis::X => self.x = calibration,
            Axis::Y => self.y = calibration,
        }
    }

    /// Normalize a raw pair into native panel coordinates.
    pub fn normalize(&self, raw_x: u16, raw_y: u16) -> Point {
        Point::new(
            self.x.normalize(raw_x) as i32,
            self.y.normalize(raw_y) as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nine evenly spaced markers, 50 raw units apart.
    const EVEN: [u16; 9] = [100, 150, 200, 250, 300, 350, 400, 450, 500];

    /// Uneven cells, the way real resistive panels come out.
    const UNEVEN: [u16; 7] = [90, 130, 210, 260, 270, 400, 640];

    #[test]
    fn test_clamps_below_and_above() {
        for n in 2..=EVEN.len() {
            let markers = &EVEN[..n];
            assert_eq!(normalize_axis(0, markers, 20), 0);
            assert_eq!(normalize_axis(markers[0], markers, 20), 0);
            let max = 20 * (n as u16 - 1) - 1;
            assert_eq!(normalize_axis(markers[n - 1], markers, 20), max);
            assert_eq!(normalize_axis(u16::MAX, markers, 20), max);
        }
    }

    #[test]
    fn test_exact_markers_map_to_grid() {
        for (i, &raw) in EVEN.iter().enumerate().take(EVEN.len() - 1) {
            assert_eq!(normalize_axis(raw, &EVEN, 20), 20 * i as u16);
        }
        for (i, &raw) in UNEVEN.iter().enumerate().take(UNEVEN.len() - 1) {
            assert_eq!(normalize_axis(raw, &UNEVEN, 20), 20 * i as u16);
        }
    }

    #[test]
    fn test_interpolates_within_cell() {
        // 270 sits 20 of 50 raw units into the cell starting at index 3.
        assert_eq!(normalize_axis(270, &EVEN, 20), 68);
        // Halfway between markers.
        assert_eq!(normalize_axis(225, &EVEN, 20), 50);
        assert_eq!(normalize_axis(335, &UNEVEN, 20), 90);
        // Odd spacing rounds half up.
        assert_eq!(normalize_axis(125, &EVEN, 15), 8);
    }

    #[test]
    fn test_monotonic_over_whole_domain() {
        for markers in [&EVEN[..], &UNEVEN[..]] {
            let mut previous = 0;
            for raw in 0..=700u16 {
                let pixel = normalize_axis(raw, markers, 20);
                assert!(pixel >= previous, "raw {raw} went back to {pixel}");
                assert!(pixel < 20 * (markers.len() as u16 - 1));
                previous = pixel;
            }
        }
    }

    #[test]
    fn test_zero_width_cell_returns_base() {
        let markers = [100, 200, 200, 300];
        assert_eq!(normalize_axis(200, &markers, 20), 40);
        assert_eq!(normalize_axis(150, &markers, 20), 10);
        assert_eq!(normalize_axis(250, &markers, 20), 50);

        let flat = [100, 150, 150, 300];
        assert_eq!(normalize_axis(150, &flat, 20), 20);
    }

    #[test]
    fn test_degenerate_marker_counts() {
        assert_eq!(normalize_axis(150, &[], 20), 0);
        assert_eq!(normalize_axis(150, &[100], 20), 0);
    }

    #[test]
    fn test_axis_validation() {
        assert_eq!(
            AxisCalibration::new(&[100], 20, false),
            Err(CalibrationError::TooFewMarkers(1))
        );
        assert_eq!(
            AxisCalibration::new(&[100, 200], 0, false),
            Err(CalibrationError::ZeroSpacing)
        );
        assert_eq!(
            AxisCalibration::new(&[100, 200, 200], 20, false),
            Err(CalibrationError::NotIncreasing {
                index: 2,
                value: 200
            })
        );
        let too_many: heapless::Vec<u16, 40> = (0..40u16).map(|i| i * 10).collect();
        assert_eq!(
            AxisCalibration::new(&too_many, 20, false),
            Err(CalibrationError::TooManyMarkers(40))
        );
    }

    #[test]
    fn test_reversed_axis_mirrors() {
        let axis = AxisCalibration::new(&EVEN, 20, true).unwrap();
        assert_eq!(axis.extent(), 160);
        // First captured marker sits at the far end.
        assert_eq!(axis.normalize(EVEN[0]), 159);
        assert_eq!(axis.normalize(EVEN[2]), 120);
        assert_eq!(axis.normalize(EVEN[8]), 1);
    }

    #[test]
    fn test_calibration_normalizes_both_axes() {
        let x = AxisCalibration::new(&EVEN, 20, false).unwrap();
        let y = AxisCalibration::new(&UNEVEN, 10, false).unwrap();
        let calibration = Calibration::new(x, y);
        assert_eq!(calibration.normalize(270, 335), Point::new(68, 45));
    }

    #[test]
    fn test_geometry_for_panel() {
        let geometry = CalibrationGeometry::for_panel(Size::new(320, 240), 20);
        assert_eq!(geometry.x_markers, 17);
        assert_eq!(geometry.y_markers, 13);
        assert_eq!(geometry.markers(Axis::Y), 13);
        assert_eq!(geometry.extent(Axis::X), 320);
    }
}

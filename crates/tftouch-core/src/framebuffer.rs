//! RAM framebuffer with rotation and dirty-region tracking.
//!
//! Widgets draw into this buffer in logical (rotated) coordinates. Pixels are
//! stored in the panel's native orientation, so [`FrameBuffer::flush`] can
//! stream the changed region to the panel controller in one contiguous
//! transfer without the controller needing to rotate anything.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PointsIter, Rectangle};
use log::debug;

use crate::geometry::Rotation;
use crate::ui::{Surface, colors};

/// Bounding box of pixels that have changed since the last flush, in panel coordinates.
#[derive(Debug, Clone, Copy)]
struct DirtyRect {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl DirtyRect {
    fn expand(&mut self, x: usize, y: usize) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn from_point(x: usize, y: usize) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }
}

/// Heap-allocated `Rgb565` framebuffer implementing [`Surface`].
pub struct FrameBuffer {
    pixels: Vec<Rgb565>,
    panel: Size,
    rotation: Rotation,
    dirty: Option<DirtyRect>,
}

impl FrameBuffer {
    /// Allocate a background-filled buffer for a panel of the given native size.
    pub fn new(panel: Size) -> Self {
        let count = panel.width as usize * panel.height as usize;
        Self {
            pixels: vec![colors::BACKGROUND; count],
            panel,
            rotation: Rotation::Deg0,
            dirty: None,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Change the logical orientation. Existing pixels stay where they are on
    /// the panel; callers redraw afterwards.
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    /// Native panel size, independent of rotation.
    pub const fn panel(&self) -> Size {
        self.panel
    }

    /// Color at a logical coordinate, `None` outside the screen.
    pub fn pixel(&self, point: Point) -> Option<Rgb565> {
        self.panel_index(point).map(|idx| self.pixels[idx])
    }

    /// Whether anything changed since the last flush.
    pub const fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Buffer index for a logical coordinate.
    fn panel_index(&self, point: Point) -> Option<usize> {
        let logical = self.size();
        if point.x < 0
            || point.y < 0
            || point.x >= logical.width as i32
            || point.y >= logical.height as i32
        {
            return None;
        }
        let p = self.rotation.logical_to_panel(point, logical);
        Some(p.y as usize * self.panel.width as usize + p.x as usize)
    }

    /// Write a single pixel, expanding the dirty rect only if the color changed.
    #[inline]
    fn set_pixel(&mut self, point: Point, color: Rgb565) {
        let Some(idx) = self.panel_index(point) else {
            return;
        };
        if self.pixels[idx] != color {
            self.pixels[idx] = color;
            let stride = self.panel.width as usize;
            let (x, y) = (idx % stride, idx / stride);
            match &mut self.dirty {
                Some(rect) => rect.expand(x, y),
                None => self.dirty = Some(DirtyRect::from_point(x, y)),
            }
        }
    }

    /// Flush the dirty region to a display in native panel orientation, then
    /// reset the dirty state.
    ///
    /// Only the bounding rectangle of changed pixels is sent, via
    /// `fill_contiguous`. If nothing changed, this is a no-op.
    pub fn flush<T>(&mut self, panel: &mut T) -> Result<(), T::Error>
    where
        T: DrawTarget<Color = Rgb565>,
    {
        let Some(rect) = self.dirty.take() else {
            return Ok(());
        };

        let width = rect.max_x - rect.min_x + 1;
        let height = rect.max_y - rect.min_y + 1;

        debug!(
            "Flushing {}x{} dirty region at ({}, {})",
            width, height, rect.min_x, rect.min_y
        );

        let area = Rectangle::new(
            Point::new(rect.min_x as i32, rect.min_y as i32),
            Size::new(width as u32, height as u32),
        );

        let pixels = &self.pixels;
        let stride = self.panel.width as usize;
        let pixel_iter = (rect.min_y..=rect.max_y).flat_map(move |y| {
            let row_start = y * stride + rect.min_x;
            pixels[row_start..row_start + width].iter().copied()
        });

        panel.fill_contiguous(&area, pixel_iter)
    }
}

impl OriginDimensions for FrameBuffer {
    /// Logical size, after rotation.
    fn size(&self) -> Size {
        self.rotation.logical_size(self.panel)
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            self.set_pixel(coord, color);
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        let mut colors = colors.into_iter();
        for row in 0..area.size.height as i32 {
            for col in 0..area.size.width as i32 {
                let Some(color) = colors.next() else {
                    return Ok(());
                };
                self.set_pixel(area.top_left + Point::new(col, row), color);
            }
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let clipped = area.intersection(&self.bounding_box());
        for point in clipped.points() {
            self.set_pixel(point, color);
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill_solid(&self.bounding_box(), color)
    }
}

impl Surface for FrameBuffer {
    fn rotation(&self) -> Rotation {
        self.rotation
    }
}

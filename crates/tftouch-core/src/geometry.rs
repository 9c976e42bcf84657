//! Widget rectangles and display rotation.

use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;
use serde::{Deserialize, Serialize};

/// Axis-aligned widget rectangle in logical screen coordinates.
///
/// Unlike [`Rectangle`], containment is inclusive on the far edges: a point at
/// `x + width` or `y + height` is still inside. Hit boundaries of existing
/// layouts depend on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Area {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_rectangle(rect: &Rectangle) -> Self {
        Self::new(
            rect.top_left.x,
            rect.top_left.y,
            rect.size.width,
            rect.size.height,
        )
    }

    pub fn to_rectangle(&self) -> Rectangle {
        Rectangle::new(self.origin(), Size::new(self.width, self.height))
    }

    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub const fn center(&self) -> Point {
        Point::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }

    /// Inclusive on both ends of both axes.
    pub const fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width as i32
            && point.y >= self.y
            && point.y <= self.y + self.height as i32
    }

    pub fn move_to(&mut self, origin: Point) {
        self.x = origin.x;
        self.y = origin.y;
    }

    pub fn move_by(&mut self, delta: Point) {
        self.x += delta.x;
        self.y += delta.y;
    }

    /// Same size, moved so both centers coincide.
    pub const fn centered_in(&self, target: &Area) -> Area {
        let target_center = target.center();
        Area::new(
            target_center.x - (self.width / 2) as i32,
            target_center.y - (self.height / 2) as i32,
            self.width,
            self.height,
        )
    }
}

impl From<Rectangle> for Area {
    fn from(rect: Rectangle) -> Self {
        Self::from_rectangle(&rect)
    }
}

/// Display rotation, clockwise, as configured on the panel controller.
///
/// The touch sensor is glued to the panel, so calibration always happens in
/// panel coordinates. Logical coordinates are what widgets see after the
/// display has been rotated.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map a controller rotation index (0..=3) to a rotation, wrapping like the controller does.
    pub const fn from_index(index: u8) -> Self {
        match index % 4 {
            0 => Self::Deg0,
            1 => Self::Deg90,
            2 => Self::Deg180,
            _ => Self::Deg270,
        }
    }

    pub const fn index(self) -> u8 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 1,
            Self::Deg180 => 2,
            Self::Deg270 => 3,
        }
    }

    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    /// Logical size of a panel of the given native size.
    pub const fn logical_size(self, panel: Size) -> Size {
        if self.swaps_axes() {
            Size::new(panel.height, panel.width)
        } else {
            panel
        }
    }

    /// Native size of a panel showing the given logical size.
    pub const fn panel_size(self, logical: Size) -> Size {
        // Swapping is its own inverse.
        self.logical_size(logical)
    }

    /// Map a point in native panel coordinates into the rotated screen of `logical` size.
    pub const fn panel_to_logical(self, panel: Point, logical: Size) -> Point {
        let w = logical.width as i32;
        let h = logical.height as i32;
        match self {
            Self::Deg0 => panel,
            Self::Deg90 => Point::new(panel.y, h - 1 - panel.x),
            Self::Deg180 => Point::new(w - 1 - panel.x, h - 1 - panel.y),
            Self::Deg270 => Point::new(w - 1 - panel.y, panel.x),
        }
    }

    /// Inverse of [`Rotation::panel_to_logical`].
    pub const fn logical_to_panel(self, logical_point: Point, logical: Size) -> Point {
        let w = logical.width as i32;
        let h = logical.height as i32;
        let p = logical_point;
        match self {
            Self::Deg0 => p,
            Self::Deg90 => Point::new(h - 1 - p.y, p.x),
            Self::Deg180 => Point::new(w - 1 - p.x, h - 1 - p.y),
            Self::Deg270 => Point::new(p.y, w - 1 - p.x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    #[test]
    fn test_contains_is_inclusive() {
        let area = Area::new(10, 20, 30, 40);
        assert!(area.contains(Point::new(10, 20)));
        assert!(area.contains(Point::new(40, 60)));
        assert!(area.contains(Point::new(40, 20)));
        assert!(area.contains(Point::new(10, 60)));
        assert!(!area.contains(Point::new(41, 60)));
        assert!(!area.contains(Point::new(40, 61)));
        assert!(!area.contains(Point::new(9, 20)));
        assert!(!area.contains(Point::new(10, 19)));
    }

    #[test]
    fn test_centered_in_aligns_centers() {
        let target = Area::new(0, 0, 320, 240);
        let dialog = Area::new(5, 5, 100, 60).centered_in(&target);
        assert_eq!(dialog, Area::new(110, 90, 100, 60));
        assert_eq!(dialog.center(), target.center());
    }

    #[test]
    fn test_centered_in_offset_target() {
        let target = Area::new(50, 100, 40, 20);
        let inner = Area::new(0, 0, 10, 10).centered_in(&target);
        assert_eq!(inner.center(), Point::new(70, 110));
        assert_eq!(inner.size(), Size::new(10, 10));
    }

    #[test]
    fn test_move_by() {
        let mut area = Area::new(1, 2, 3, 4);
        area.move_by(Point::new(10, -2));
        assert_eq!(area.origin(), Point::new(11, 0));
        area.move_to(Point::new(-5, 7));
        assert_eq!(area, Area::new(-5, 7, 3, 4));
    }

    #[test]
    fn test_rotation_concrete_cases() {
        // Panel is 240x320 portrait.
        let panel = Size::new(240, 320);
        let p = Point::new(10, 20);

        let r0 = Rotation::Deg0;
        assert_eq!(r0.panel_to_logical(p, r0.logical_size(panel)), Point::new(10, 20));

        let r1 = Rotation::Deg90;
        let l1 = r1.logical_size(panel);
        assert_eq!(l1, Size::new(320, 240));
        assert_eq!(r1.panel_to_logical(p, l1), Point::new(20, 229));

        let r2 = Rotation::Deg180;
        let l2 = r2.logical_size(panel);
        assert_eq!(r2.panel_to_logical(p, l2), Point::new(229, 299));

        let r3 = Rotation::Deg270;
        let l3 = r3.logical_size(panel);
        assert_eq!(r3.panel_to_logical(p, l3), Point::new(299, 10));
    }

    #[test]
    fn test_rotation_round_trip_and_bounds() {
        let panel = Size::new(240, 320);
        for rotation in ALL {
            let logical = rotation.logical_size(panel);
            for &(x, y) in &[(0, 0), (239, 0), (0, 319), (239, 319), (120, 77)] {
                let p = Point::new(x, y);
                let l = rotation.panel_to_logical(p, logical);
                assert!(l.x >= 0 && l.x < logical.width as i32, "{rotation:?} {l:?}");
                assert!(l.y >= 0 && l.y < logical.height as i32, "{rotation:?} {l:?}");
                assert_eq!(rotation.logical_to_panel(l, logical), p);
            }
        }
    }

    #[test]
    fn test_rotation_from_index_wraps() {
        assert_eq!(Rotation::from_index(1), Rotation::Deg90);
        assert_eq!(Rotation::from_index(6), Rotation::Deg180);
        for rotation in ALL {
            assert_eq!(Rotation::from_index(rotation.index()), rotation);
        }
    }
}

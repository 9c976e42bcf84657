use embassy_time::Instant;
use embedded_graphics::prelude::Point;

use crate::ui::{EventKind, WidgetId};

/// State the touch state machine carries between polls.
///
/// The `previous_*` fields hold the values from before the last processed
/// transition. Polls that change nothing (released to released, jitter)
/// leave the whole record untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSession {
    pub pressed: bool,
    pub previous_pressed: bool,
    pub point: Point,
    pub previous_point: Point,
    pub kind: EventKind,
    pub previous_kind: EventKind,
    pub source: Option<WidgetId>,
    pub previous_source: Option<WidgetId>,
    /// Time of the last processed transition; inactivity is measured from here.
    pub timestamp: Instant,
}

impl TouchSession {
    pub const fn new(now: Instant) -> Self {
        Self {
            pressed: false,
            previous_pressed: false,
            point: Point::zero(),
            previous_point: Point::zero(),
            kind: EventKind::None,
            previous_kind: EventKind::None,
            source: None,
            previous_source: None,
            timestamp: now,
        }
    }

    /// Copy the current fields into the `previous_*` ones.
    pub fn save_state(&mut self) {
        self.previous_pressed = self.pressed;
        self.previous_point = self.point;
        self.previous_kind = self.kind;
        self.previous_source = self.source;
    }
}

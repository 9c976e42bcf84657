use embassy_time::Instant;
use embedded_graphics::prelude::Point;

use super::tree::WidgetId;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    None,
    /// First pressed sample of a press session.
    Touch,
    /// Press session ended.
    Untouch,
    /// Pressed sample that moved beyond the jitter threshold.
    Draw,
    TtyInScope,
    TtyOutOfScope,
    GotoSleep,
    WakeUp,
    /// A press session moved onto the widget.
    InScope,
    /// A press session left the widget, or ended on it.
    OutOfScope,
    /// Application-defined event, routed to the unsolicited hook.
    Custom(u16),
}

/// An event on its way up the widget tree.
///
/// Handlers may clear `propagate` to keep the event from reaching the parent
/// of the widget currently handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    pub kind: EventKind,
    pub timestamp: Instant,
    pub point: Point,
    pub source: Option<WidgetId>,
    pub propagate: bool,
}

impl TouchEvent {
    pub const fn new(
        kind: EventKind,
        timestamp: Instant,
        point: Point,
        source: Option<WidgetId>,
    ) -> Self {
        Self {
            kind,
            timestamp,
            point,
            source,
            propagate: true,
        }
    }

    /// Event aimed at `source`, without a meaningful position.
    pub const fn targeted(kind: EventKind, timestamp: Instant, source: WidgetId) -> Self {
        Self::new(kind, timestamp, Point::zero(), Some(source))
    }

    pub fn stop_propagation(&mut self) {
        self.propagate = false;
    }
}

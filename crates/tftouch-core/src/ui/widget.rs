//! Widget behavior trait.
//!
//! A widget's geometry, visibility and tree links live in the
//! [`WidgetTree`](super::WidgetTree); this trait only carries what differs
//! between widget kinds: how they draw and how they react to events.
//! Every method has a no-op default, so a widget only overrides what it
//! needs.

use super::Surface;
use super::event::{EventKind, TouchEvent};
use super::screen::EventContext;
use crate::geometry::Area;

pub trait Widget<D: Surface> {
    /// Render the widget into `area`.
    fn draw(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
        let _ = (area, display);
        Ok(())
    }

    /// Render the widget in its inverted (highlighted) look.
    fn draw_inverted(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
        self.draw(area, display)
    }

    /// Route an event to the matching hook.
    ///
    /// Kinds without a dedicated hook go to [`Widget::on_unsolicited`].
    fn on_event(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        match event.kind {
            EventKind::Touch => self.on_touch(cx, event),
            EventKind::Untouch => self.on_untouch(cx, event),
            EventKind::Draw => self.on_draw(cx, event),
            EventKind::TtyInScope => self.on_tty_in_scope(cx, event),
            EventKind::TtyOutOfScope => self.on_tty_out_of_scope(cx, event),
            EventKind::GotoSleep => self.on_goto_sleep(cx, event),
            EventKind::WakeUp => self.on_wake_up(cx, event),
            EventKind::InScope => self.on_in_scope(cx, event),
            EventKind::OutOfScope => self.on_out_of_scope(cx, event),
            EventKind::None | EventKind::Custom(_) => self.on_unsolicited(cx, event),
        }
    }

    fn on_touch(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_untouch(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_draw(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_tty_in_scope(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_tty_out_of_scope(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_goto_sleep(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_wake_up(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_in_scope(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_out_of_scope(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}

    fn on_unsolicited(&mut self, _cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {}
}

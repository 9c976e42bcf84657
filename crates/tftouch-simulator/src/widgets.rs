//! Demo widgets for the simulator window.

use embedded_graphics::mono_font::{MonoTextStyle, ascii::FONT_6X10};
use embedded_graphics::pixelcolor::{Rgb565, WebColors};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, PrimitiveStyle, RoundedRectangle};
use embedded_graphics::text::{Alignment, Text};
use log::{debug, warn};

use tftouch_core::geometry::Area;
use tftouch_core::ui::{EventContext, EventKind, Surface, TouchEvent, Widget, WidgetId};

/// Event code a [`Button`] sends to its target when clicked.
pub const CLICKED: u16 = 1;

const CORNER_RADIUS: u32 = 8;

/// Solid background for grouping other widgets.
pub struct Panel {
    color: Rgb565,
}

impl Panel {
    pub fn new(color: Rgb565) -> Self {
        Self { color }
    }
}

impl<D: Surface> Widget<D> for Panel {
    fn draw(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
        display.fill_solid(&area.to_rectangle(), self.color)
    }
}

/// Push button with a text label.
///
/// Highlighted while a press is on it. Releasing the press on the button
/// sends [`CLICKED`] to its target through the deferred queue.
pub struct Button {
    label: &'static str,
    color: Rgb565,
    target: WidgetId,
}

impl Button {
    pub fn new(label: &'static str, color: Rgb565, target: WidgetId) -> Self {
        Self {
            label,
            color,
            target,
        }
    }

    fn render<D: Surface>(
        &self,
        area: &Area,
        display: &mut D,
        fill: Rgb565,
        text: Rgb565,
    ) -> Result<(), D::Error> {
        let corner = Size::new(CORNER_RADIUS, CORNER_RADIUS);
        RoundedRectangle::with_equal_corners(area.to_rectangle(), corner)
            .into_styled(PrimitiveStyle::with_fill(fill))
            .draw(display)?;

        let style = MonoTextStyle::new(&FONT_6X10, text);
        Text::with_alignment(self.label, area.center(), style, Alignment::Center).draw(display)?;
        Ok(())
    }
}

impl<D: Surface> Widget<D> for Button {
    fn draw(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
        self.render(area, display, self.color, Rgb565::WHITE)
    }

    fn draw_inverted(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
        self.render(area, display, Rgb565::WHITE, self.color)
    }

    fn on_in_scope(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        highlight(cx, true);
        event.stop_propagation();
    }

    fn on_out_of_scope(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        highlight(cx, false);
        event.stop_propagation();
    }

    fn on_untouch(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        debug!("{} clicked", self.label);
        let click = TouchEvent::new(
            EventKind::Custom(CLICKED),
            event.timestamp,
            event.point,
            Some(self.target),
        );
        if let Err(e) = cx.dispatch_later(click) {
            warn!("{} click lost: {}", self.label, e);
        }
        event.stop_propagation();
    }
}

fn highlight<D: Surface>(cx: &mut EventContext<'_, D>, on: bool) {
    let id = cx.widget();
    if let Err(e) = cx.set_inverted(id, on) {
        warn!("Failed to highlight {:?}: {:?}", id, e);
    }
}

/// Shows how often it received [`CLICKED`].
#[derive(Default)]
pub struct Counter {
    clicks: u32,
}

impl<D: Surface> Widget<D> for Counter {
    fn draw(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
        display.fill_solid(&area.to_rectangle(), Rgb565::BLACK)?;
        let text = format!("Clicks: {}", self.clicks);
        let style = MonoTextStyle::new(&FONT_6X10, Rgb565::YELLOW);
        Text::with_alignment(&text, area.center(), style, Alignment::Center).draw(display)?;
        Ok(())
    }

    fn on_unsolicited(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        if event.kind == EventKind::Custom(CLICKED) {
            self.clicks += 1;
            let id = cx.widget();
            if let Err(e) = cx.redraw(id) {
                warn!("Failed to redraw counter: {:?}", e);
            }
            event.stop_propagation();
        }
    }
}

/// Leaves a dot wherever it is touched; cleared by [`CLICKED`].
pub struct SketchPad {
    ink: Rgb565,
}

impl SketchPad {
    pub fn new(ink: Rgb565) -> Self {
        Self { ink }
    }

    fn dot<D: Surface>(&self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        let dot = Circle::with_center(event.point, 5).into_styled(PrimitiveStyle::with_fill(self.ink));
        let clip = cx.area().to_rectangle();
        if let Err(e) = dot.draw(&mut cx.display_mut().clipped(&clip)) {
            warn!("Failed to draw on sketch pad: {:?}", e);
        }
        event.stop_propagation();
    }
}

impl<D: Surface> Widget<D> for SketchPad {
    fn draw(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
        display.fill_solid(&area.to_rectangle(), Rgb565::CSS_DARK_SLATE_GRAY)
    }

    fn on_touch(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        self.dot(cx, event);
    }

    fn on_draw(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        self.dot(cx, event);
    }

    fn on_unsolicited(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
        if event.kind == EventKind::Custom(CLICKED) {
            let id = cx.widget();
            if let Err(e) = cx.redraw(id) {
                warn!("Failed to clear sketch pad: {:?}", e);
            }
            event.stop_propagation();
        }
    }
}

//! Screen: the root widget, its display and the event dispatcher.
//!
//! # Dispatch
//!
//! [`Screen::dispatch_only`] hands an event to its source widget and then to
//! each ancestor in turn, until the root is passed or a handler clears
//! `propagate`. An event without a (live) source goes to the unsolicited
//! handler instead.
//!
//! Handlers never dispatch synchronously. They get an [`EventContext`] that
//! can queue follow-up events with `dispatch_later`; [`Screen::dispatch`]
//! drains that queue before and after the event it was given, so the queue
//! is empty whenever `dispatch` returns.
//!
//! # Drawing
//!
//! Widgets are drawn parent first, then children from the oldest to the most
//! recent one, so the most recently added child ends up on top. Nothing is
//! drawn for widgets that are hidden, detached, or below a hidden ancestor,
//! which includes everything while the screen sleeps.

use alloc::boxed::Box;
use alloc::vec::Vec;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use heapless::Deque;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use super::Surface;
use super::colors;
use super::event::{EventKind, TouchEvent};
use super::tree::{TreeError, TreeResult, WidgetId, WidgetTree};
use super::widget::Widget;
use crate::geometry::Area;

/// Deferred events the screen holds at most.
pub const LATER_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("deferred event queue is full, dropped {0:?}")]
    QueueFull(EventKind),
}

pub type UnsolicitedHandler = Box<dyn FnMut(&TouchEvent)>;

/// Behavior of the root widget: sleeping hides the whole screen, waking up
/// shows it again.
struct ScreenRoot;

impl<D: Surface> Widget<D> for ScreenRoot {
    fn on_goto_sleep(&mut self, cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {
        info!("Screen going to sleep");
        if let Err(e) = cx.set_visible(cx.root(), false) {
            warn!("Failed to blank screen: {:?}", e);
        }
    }

    fn on_wake_up(&mut self, cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {
        info!("Screen waking up");
        if let Err(e) = cx.set_visible(cx.root(), true) {
            warn!("Failed to redraw screen: {:?}", e);
        }
    }
}

pub struct Screen<D: Surface> {
    display: D,
    tree: WidgetTree<D>,
    root: WidgetId,
    later: Deque<TouchEvent, LATER_QUEUE_CAPACITY>,
    background: Rgb565,
    unsolicited: Option<UnsolicitedHandler>,
}

impl<D: Surface> Screen<D> {
    /// Wrap a display; the root widget covers its full logical size.
    pub fn new(display: D) -> Self {
        let size = display.size();
        let mut tree = WidgetTree::new();
        let root = tree.insert(Area::new(0, 0, size.width, size.height), ScreenRoot);
        Self {
            display,
            tree,
            root,
            later: Deque::new(),
            background: colors::BACKGROUND,
            unsolicited: None,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn tree(&self) -> &WidgetTree<D> {
        &self.tree
    }

    pub const fn root(&self) -> WidgetId {
        self.root
    }

    pub const fn background(&self) -> Rgb565 {
        self.background
    }

    /// Color used to clear hidden widgets and to paint the root.
    pub fn set_background(&mut self, color: Rgb565) {
        self.background = color;
    }

    /// Receive events that have no source widget.
    pub fn set_unsolicited_handler(&mut self, handler: impl FnMut(&TouchEvent) + 'static) {
        self.unsolicited = Some(Box::new(handler));
    }

    // -----------------------------------------------------------------------
    // Tree
    // -----------------------------------------------------------------------

    /// Create a detached widget. Attach it with [`Screen::add_child`].
    pub fn insert<W: Widget<D> + 'static>(&mut self, area: Area, widget: W) -> WidgetId {
        self.tree.insert(area, widget)
    }

    pub fn add_child(&mut self, parent: WidgetId, child: WidgetId) -> TreeResult<()> {
        self.tree.add_child(parent, child)
    }

    pub fn remove(&mut self, id: WidgetId) -> TreeResult<()> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        self.tree.remove(id)
    }

    pub fn destroy(&mut self, id: WidgetId) -> TreeResult<()> {
        if id == self.root {
            return Err(TreeError::RootImmutable);
        }
        self.tree.destroy(id)
    }

    pub fn area(&self, id: WidgetId) -> Option<Area> {
        self.tree.area(id)
    }

    pub fn is_visible(&self, id: WidgetId) -> bool {
        self.tree.is_visible(id)
    }

    /// False while the screen sleeps.
    pub fn is_awake(&self) -> bool {
        self.tree.is_visible(self.root)
    }

    /// Deepest visible widget under `point`.
    pub fn match_widget(&self, point: Point) -> Option<WidgetId> {
        self.tree.match_from(self.root, point)
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Show or hide a widget.
    ///
    /// Showing redraws it with its visible children; hiding paints its area
    /// with the background color. Setting the current state does nothing.
    pub fn set_visible(&mut self, id: WidgetId, visible: bool) -> Result<(), D::Error> {
        let changed = match self.tree.set_visible_flag(id, visible) {
            Ok(changed) => changed,
            Err(e) => {
                warn!("set_visible ignored: {}", e);
                return Ok(());
            }
        };
        if !changed {
            return Ok(());
        }
        if visible {
            self.redraw(id)
        } else {
            self.clear(id)
        }
    }

    pub fn set_inverted(&mut self, id: WidgetId, inverted: bool) -> Result<(), D::Error> {
        match self.tree.set_inverted_flag(id, inverted) {
            Ok(true) => self.redraw(id),
            Ok(false) => Ok(()),
            Err(e) => {
                warn!("set_inverted ignored: {}", e);
                Ok(())
            }
        }
    }

    /// Redraw a widget and its visible children, if it is on screen.
    pub fn redraw(&mut self, id: WidgetId) -> Result<(), D::Error> {
        if !self.on_screen(id) {
            return Ok(());
        }
        self.draw_subtree(id)
    }

    pub fn redraw_all(&mut self) -> Result<(), D::Error> {
        self.redraw(self.root)
    }

    /// Paint a widget's area with the background color.
    pub fn clear(&mut self, id: WidgetId) -> Result<(), D::Error> {
        let Some(area) = self.tree.area(id) else {
            return Ok(());
        };
        let parent_shown = id == self.root
            || self
                .tree
                .parent(id)
                .is_some_and(|parent| self.on_screen(parent));
        if !parent_shown {
            return Ok(());
        }
        self.display.fill_solid(&area.to_rectangle(), self.background)
    }

    /// Visible itself, attached to the root, and every ancestor visible.
    fn on_screen(&self, id: WidgetId) -> bool {
        let mut current = id;
        loop {
            if !self.tree.is_visible(current) {
                return false;
            }
            if current == self.root {
                return true;
            }
            match self.tree.parent(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn draw_subtree(&mut self, id: WidgetId) -> Result<(), D::Error> {
        if !self.tree.is_visible(id) {
            return Ok(());
        }
        let Some(area) = self.tree.area(id) else {
            return Ok(());
        };

        if id == self.root {
            self.display
                .fill_solid(&area.to_rectangle(), self.background)?;
        }

        let drawn = match self.tree.behavior(id) {
            Some(behavior) if self.tree.is_inverted(id) => {
                behavior.draw_inverted(&area, &mut self.display)?;
                true
            }
            Some(behavior) => {
                behavior.draw(&area, &mut self.display)?;
                true
            }
            None => false,
        };
        // The root only paints the background, which was done above.
        if !drawn && id != self.root {
            self.tree.mark_redraw_pending(id);
        }

        let children: Vec<WidgetId> = self.tree.children(id).collect();
        for child in children.into_iter().rev() {
            self.draw_subtree(child)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Deliver an event to its source and up the parent chain.
    ///
    /// Returns the last widget whose handler ran, or `None` when the event
    /// went to the unsolicited handler.
    pub fn dispatch_only(&mut self, event: &mut TouchEvent) -> Option<WidgetId> {
        let Some(mut current) = event.source.filter(|id| self.tree.exists(*id)) else {
            self.unsolicited(event);
            return None;
        };

        loop {
            self.invoke(current, event);
            match self.tree.parent(current) {
                Some(parent) if event.propagate => current = parent,
                _ => return Some(current),
            }
        }
    }

    /// Queue an event for after the current dispatch.
    pub fn dispatch_later(&mut self, event: TouchEvent) -> Result<(), DispatchError> {
        self.later.push_back(event).map_err(|event| {
            warn!("Deferred queue full, dropping {:?}", event.kind);
            DispatchError::QueueFull(event.kind)
        })
    }

    /// Drain the deferred queue, deliver `event`, then drain again.
    pub fn dispatch(&mut self, event: TouchEvent) -> Option<WidgetId> {
        self.drain_later();
        let mut event = event;
        let last = self.dispatch_only(&mut event);
        self.drain_later();
        last
    }

    /// Deliver the oldest deferred event, if any.
    pub fn dispatch_next(&mut self) -> bool {
        let Some(mut event) = self.later.pop_front() else {
            return false;
        };
        self.dispatch_only(&mut event);
        true
    }

    pub fn pending_events(&self) -> usize {
        self.later.len()
    }

    fn drain_later(&mut self) {
        while self.dispatch_next() {}
    }

    fn unsolicited(&mut self, event: &TouchEvent) {
        match self.unsolicited.as_mut() {
            Some(handler) => handler(event),
            None => debug!("Unsolicited {:?} at {:?}", event.kind, event.point),
        }
    }

    fn invoke(&mut self, id: WidgetId, event: &mut TouchEvent) {
        let Some(mut behavior) = self.tree.take_behavior(id) else {
            debug!("Widget {:?} is busy, skipping {:?}", id, event.kind);
            return;
        };

        behavior.on_event(
            &mut EventContext {
                screen: self,
                widget: id,
            },
            event,
        );

        if self.tree.restore_behavior(id, behavior)
            && self.tree.take_redraw_pending(id)
            && let Err(e) = self.redraw(id)
        {
            warn!("Deferred redraw of {:?} failed: {:?}", id, e);
        }
    }
}

/// What an event handler may do to the screen.
///
/// Everything except synchronous dispatch: follow-up events go through
/// [`EventContext::dispatch_later`].
pub struct EventContext<'a, D: Surface> {
    screen: &'a mut Screen<D>,
    widget: WidgetId,
}

impl<D: Surface> EventContext<'_, D> {
    /// The widget whose handler is running.
    pub fn widget(&self) -> WidgetId {
        self.widget
    }

    pub fn root(&self) -> WidgetId {
        self.screen.root
    }

    /// Area of the widget whose handler is running.
    pub fn area(&self) -> Area {
        self.screen.area(self.widget).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<WidgetId> {
        self.screen.tree.parent(self.widget)
    }

    pub fn tree(&self) -> &WidgetTree<D> {
        &self.screen.tree
    }

    pub fn background(&self) -> Rgb565 {
        self.screen.background
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.screen.display
    }

    pub fn is_visible(&self, id: WidgetId) -> bool {
        self.screen.is_visible(id)
    }

    pub fn is_inverted(&self, id: WidgetId) -> bool {
        self.screen.tree.is_inverted(id)
    }

    pub fn set_visible(&mut self, id: WidgetId, visible: bool) -> Result<(), D::Error> {
        self.screen.set_visible(id, visible)
    }

    pub fn set_inverted(&mut self, id: WidgetId, inverted: bool) -> Result<(), D::Error> {
        self.screen.set_inverted(id, inverted)
    }

    pub fn redraw(&mut self, id: WidgetId) -> Result<(), D::Error> {
        self.screen.redraw(id)
    }

    pub fn insert<W: Widget<D> + 'static>(&mut self, area: Area, widget: W) -> WidgetId {
        self.screen.insert(area, widget)
    }

    pub fn add_child(&mut self, parent: WidgetId, child: WidgetId) -> TreeResult<()> {
        self.screen.add_child(parent, child)
    }

    pub fn remove(&mut self, id: WidgetId) -> TreeResult<()> {
        self.screen.remove(id)
    }

    pub fn destroy(&mut self, id: WidgetId) -> TreeResult<()> {
        self.screen.destroy(id)
    }

    pub fn dispatch_later(&mut self, event: TouchEvent) -> Result<(), DispatchError> {
        self.screen.dispatch_later(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::FrameBuffer;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::{Cell, RefCell};
    use embassy_time::Instant;
    use embedded_graphics::pixelcolor::RgbColor;

    type Log = Rc<RefCell<Vec<(&'static str, EventKind)>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        stop: bool,
    }

    impl<D: Surface> Widget<D> for Recorder {
        fn on_event(&mut self, _cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
            self.log.borrow_mut().push((self.name, event.kind));
            if self.stop {
                event.stop_propagation();
            }
        }
    }

    /// Forwards every touch to `target` through the deferred queue.
    struct Forwarder {
        log: Log,
        target: WidgetId,
    }

    impl<D: Surface> Widget<D> for Forwarder {
        fn on_touch(&mut self, cx: &mut EventContext<'_, D>, event: &mut TouchEvent) {
            self.log.borrow_mut().push(("forwarder", event.kind));
            let follow_up = TouchEvent::targeted(EventKind::Custom(7), event.timestamp, self.target);
            cx.dispatch_later(follow_up).unwrap();
        }
    }

    /// Solid block, blue when inverted.
    struct Swatch {
        color: Rgb565,
        draws: Rc<Cell<u32>>,
    }

    impl<D: Surface> Widget<D> for Swatch {
        fn draw(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
            self.draws.set(self.draws.get() + 1);
            display.fill_solid(&area.to_rectangle(), self.color)
        }

        fn draw_inverted(&self, area: &Area, display: &mut D) -> Result<(), D::Error> {
            self.draws.set(self.draws.get() + 1);
            display.fill_solid(&area.to_rectangle(), Rgb565::BLUE)
        }

        fn on_touch(&mut self, cx: &mut EventContext<'_, D>, _event: &mut TouchEvent) {
            let inverted = cx.is_inverted(cx.widget());
            cx.set_inverted(cx.widget(), !inverted).unwrap();
        }
    }

    fn screen() -> Screen<FrameBuffer> {
        Screen::new(FrameBuffer::new(Size::new(100, 100)))
    }

    fn at(kind: EventKind, source: WidgetId) -> TouchEvent {
        TouchEvent::targeted(kind, Instant::from_millis(0), source)
    }

    fn recorder(screen: &mut Screen<FrameBuffer>, log: &Log, name: &'static str) -> WidgetId {
        screen.insert(
            Area::new(0, 0, 50, 50),
            Recorder {
                name,
                log: log.clone(),
                stop: false,
            },
        )
    }

    fn swatch(
        screen: &mut Screen<FrameBuffer>,
        area: Area,
        color: Rgb565,
    ) -> (WidgetId, Rc<Cell<u32>>) {
        let draws = Rc::new(Cell::new(0));
        let id = screen.insert(
            area,
            Swatch {
                color,
                draws: draws.clone(),
            },
        );
        let root = screen.root();
        screen.add_child(root, id).unwrap();
        (id, draws)
    }

    #[test]
    fn test_dispatch_walks_parent_chain() {
        let log = Log::default();
        let mut screen = screen();
        let panel = recorder(&mut screen, &log, "panel");
        let button = recorder(&mut screen, &log, "button");
        screen.add_child(screen.root(), panel).unwrap();
        screen.add_child(panel, button).unwrap();

        let last = screen.dispatch(at(EventKind::Touch, button));
        assert_eq!(
            *log.borrow(),
            vec![("button", EventKind::Touch), ("panel", EventKind::Touch)]
        );
        assert_eq!(last, Some(screen.root()));
    }

    #[test]
    fn test_cleared_propagate_stops_at_source() {
        let log = Log::default();
        let mut screen = screen();
        let panel = recorder(&mut screen, &log, "panel");
        let button = screen.insert(
            Area::new(0, 0, 10, 10),
            Recorder {
                name: "button",
                log: log.clone(),
                stop: true,
            },
        );
        screen.add_child(screen.root(), panel).unwrap();
        screen.add_child(panel, button).unwrap();

        let mut event = at(EventKind::Untouch, button);
        assert_eq!(screen.dispatch_only(&mut event), Some(button));
        assert_eq!(*log.borrow(), vec![("button", EventKind::Untouch)]);
        assert!(!event.propagate);
    }

    #[test]
    fn test_sourceless_event_is_unsolicited() {
        let log = Log::default();
        let mut screen = screen();
        let sink = log.clone();
        screen.set_unsolicited_handler(move |event| {
            sink.borrow_mut().push(("unsolicited", event.kind));
        });

        let mut event = TouchEvent::new(EventKind::Touch, Instant::from_millis(0), Point::zero(), None);
        assert_eq!(screen.dispatch_only(&mut event), None);

        // Destroyed widgets count as no source.
        let gone = recorder(&mut screen, &log, "gone");
        screen.destroy(gone).unwrap();
        screen.dispatch(at(EventKind::Draw, gone));

        assert_eq!(
            *log.borrow(),
            vec![
                ("unsolicited", EventKind::Touch),
                ("unsolicited", EventKind::Draw)
            ]
        );
    }

    #[test]
    fn test_dispatch_drains_queue_in_order() {
        let log = Log::default();
        let mut screen = screen();
        let widget = recorder(&mut screen, &log, "w");
        for n in 1..=3 {
            screen.dispatch_later(at(EventKind::Custom(n), widget)).unwrap();
        }
        assert_eq!(screen.pending_events(), 3);

        screen.dispatch(at(EventKind::Touch, widget));
        assert_eq!(
            *log.borrow(),
            vec![
                ("w", EventKind::Custom(1)),
                ("w", EventKind::Custom(2)),
                ("w", EventKind::Custom(3)),
                ("w", EventKind::Touch),
            ]
        );
        assert_eq!(screen.pending_events(), 0);
    }

    #[test]
    fn test_deferred_events_run_after_current_dispatch() {
        let log = Log::default();
        let mut screen = screen();
        let target = recorder(&mut screen, &log, "target");
        let parent = recorder(&mut screen, &log, "parent");
        let forwarder = screen.insert(
            Area::new(0, 0, 10, 10),
            Forwarder {
                log: log.clone(),
                target,
            },
        );
        screen.add_child(parent, forwarder).unwrap();

        screen.dispatch(at(EventKind::Touch, forwarder));
        assert_eq!(
            *log.borrow(),
            vec![
                ("forwarder", EventKind::Touch),
                ("parent", EventKind::Touch),
                ("target", EventKind::Custom(7)),
            ]
        );
        assert_eq!(screen.pending_events(), 0);
    }

    #[test]
    fn test_dispatch_next_runs_one_event() {
        let log = Log::default();
        let mut screen = screen();
        let widget = recorder(&mut screen, &log, "w");
        screen.dispatch_later(at(EventKind::Custom(1), widget)).unwrap();
        screen.dispatch_later(at(EventKind::Custom(2), widget)).unwrap();

        assert!(screen.dispatch_next());
        assert_eq!(*log.borrow(), vec![("w", EventKind::Custom(1))]);
        assert_eq!(screen.pending_events(), 1);
        assert!(screen.dispatch_next());
        assert!(!screen.dispatch_next());
    }

    #[test]
    fn test_full_queue_is_reported() {
        let mut screen = screen();
        let root = screen.root();
        for _ in 0..LATER_QUEUE_CAPACITY {
            screen.dispatch_later(at(EventKind::Custom(0), root)).unwrap();
        }
        assert_eq!(
            screen.dispatch_later(at(EventKind::Custom(1), root)),
            Err(DispatchError::QueueFull(EventKind::Custom(1)))
        );
    }

    #[test]
    fn test_set_visible_redraws_and_clears() {
        let mut screen = screen();
        let (id, draws) = swatch(&mut screen, Area::new(10, 10, 20, 20), Rgb565::RED);
        screen.redraw_all().unwrap();
        let inside = Point::new(15, 15);
        assert_eq!(screen.display().pixel(inside), Some(Rgb565::RED));
        assert_eq!(draws.get(), 1);

        screen.set_visible(id, false).unwrap();
        assert_eq!(screen.display().pixel(inside), Some(colors::BACKGROUND));

        // Hidden widgets are not drawn, even on request.
        screen.redraw(id).unwrap();
        assert_eq!(draws.get(), 1);

        screen.set_visible(id, true).unwrap();
        assert_eq!(screen.display().pixel(inside), Some(Rgb565::RED));
        assert_eq!(draws.get(), 2);

        screen.set_visible(id, true).unwrap();
        assert_eq!(draws.get(), 2);
    }

    #[test]
    fn test_sleep_blanks_and_wake_restores() {
        let mut screen = screen();
        let (id, draws) = swatch(&mut screen, Area::new(10, 10, 20, 20), Rgb565::RED);
        screen.redraw_all().unwrap();
        let root = screen.root();

        screen.dispatch(at(EventKind::GotoSleep, root));
        assert!(!screen.is_awake());
        assert_eq!(screen.display().pixel(Point::new(15, 15)), Some(colors::BACKGROUND));
        assert_eq!(screen.match_widget(Point::new(15, 15)), None);

        screen.redraw(id).unwrap();
        assert_eq!(draws.get(), 1);

        screen.dispatch(at(EventKind::WakeUp, root));
        assert!(screen.is_awake());
        assert_eq!(screen.display().pixel(Point::new(15, 15)), Some(Rgb565::RED));
        assert_eq!(draws.get(), 2);
    }

    #[test]
    fn test_redraw_from_own_handler_is_deferred() {
        let mut screen = screen();
        let (id, draws) = swatch(&mut screen, Area::new(10, 10, 20, 20), Rgb565::RED);
        screen.redraw_all().unwrap();

        screen.dispatch(at(EventKind::Touch, id));
        assert!(screen.tree().is_inverted(id));
        assert_eq!(screen.display().pixel(Point::new(15, 15)), Some(Rgb565::BLUE));
        assert_eq!(draws.get(), 2);
    }

    #[test]
    fn test_newest_child_draws_on_top() {
        let mut screen = screen();
        swatch(&mut screen, Area::new(0, 0, 30, 30), Rgb565::RED);
        swatch(&mut screen, Area::new(20, 20, 30, 30), Rgb565::GREEN);
        screen.redraw_all().unwrap();
        assert_eq!(screen.display().pixel(Point::new(25, 25)), Some(Rgb565::GREEN));
        assert_eq!(screen.display().pixel(Point::new(5, 5)), Some(Rgb565::RED));
        assert!(screen.match_widget(Point::new(25, 25)).is_some());
    }

    #[test]
    fn test_detached_widgets_are_not_drawn() {
        let mut screen = screen();
        let (id, draws) = swatch(&mut screen, Area::new(10, 10, 20, 20), Rgb565::RED);
        screen.remove(id).unwrap();
        screen.redraw(id).unwrap();
        assert_eq!(draws.get(), 0);
        assert_eq!(screen.remove(screen.root()), Err(TreeError::RootImmutable));
        assert_eq!(screen.destroy(screen.root()), Err(TreeError::RootImmutable));
    }
}

//! Arena-backed widget tree.
//!
//! Nodes are linked the classic way: a parent back-reference, a first-child
//! link and a next-sibling link. New children are pushed at the head of the
//! list, so iteration and hit-testing visit the most recently added child
//! first.
//!
//! Widgets are addressed through generation-checked [`WidgetId`]s. A
//! detached widget keeps its slot until it is destroyed; a destroyed widget's
//! id never resolves again, even when its slot is reused.

use alloc::boxed::Box;
use alloc::vec::Vec;

use embedded_graphics::prelude::Point;
use thiserror_no_std::Error;

use super::Surface;
use super::widget::Widget;
use crate::geometry::Area;

/// Handle to a widget in a [`WidgetTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId {
    index: u32,
    generation: u32,
}

impl WidgetId {
    pub const fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("widget {0:?} does not exist")]
    UnknownWidget(WidgetId),

    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    WouldCycle { parent: WidgetId, child: WidgetId },

    #[error("the screen root cannot be detached or destroyed")]
    RootImmutable,
}

pub type TreeResult<T> = Result<T, TreeError>;

struct Node<D: Surface> {
    area: Area,
    visible: bool,
    inverted: bool,
    parent: Option<WidgetId>,
    first_child: Option<WidgetId>,
    next_sibling: Option<WidgetId>,
    /// Checked out while one of its hooks runs.
    behavior: Option<Box<dyn Widget<D>>>,
    /// A redraw was requested while the behavior was checked out.
    redraw_pending: bool,
}

struct Slot<D: Surface> {
    generation: u32,
    node: Option<Node<D>>,
}

pub struct WidgetTree<D: Surface> {
    slots: Vec<Slot<D>>,
    free: Vec<u32>,
    len: usize,
}

impl<D: Surface> Default for WidgetTree<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Surface> WidgetTree<D> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live widgets, attached or not.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add a detached, visible widget.
    pub fn insert<W: Widget<D> + 'static>(&mut self, area: Area, widget: W) -> WidgetId {
        self.insert_boxed(area, Box::new(widget))
    }

    pub fn insert_boxed(&mut self, area: Area, behavior: Box<dyn Widget<D>>) -> WidgetId {
        let node = Node {
            area,
            visible: true,
            inverted: false,
            parent: None,
            first_child: None,
            next_sibling: None,
            behavior: Some(behavior),
            redraw_pending: false,
        };
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return WidgetId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        WidgetId {
            index,
            generation: 0,
        }
    }

    fn node(&self, id: WidgetId) -> Option<&Node<D>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: WidgetId) -> Option<&mut Node<D>> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn try_node_mut(&mut self, id: WidgetId) -> TreeResult<&mut Node<D>> {
        self.node_mut(id).ok_or(TreeError::UnknownWidget(id))
    }

    pub fn exists(&self, id: WidgetId) -> bool {
        self.node(id).is_some()
    }

    pub fn area(&self, id: WidgetId) -> Option<Area> {
        self.node(id).map(|node| node.area)
    }

    pub fn set_area(&mut self, id: WidgetId, area: Area) -> TreeResult<()> {
        self.try_node_mut(id)?.area = area;
        Ok(())
    }

    /// Own visibility flag only; ancestors are not consulted.
    pub fn is_visible(&self, id: WidgetId) -> bool {
        self.node(id).is_some_and(|node| node.visible)
    }

    /// Returns whether the flag changed.
    pub(crate) fn set_visible_flag(&mut self, id: WidgetId, visible: bool) -> TreeResult<bool> {
        let node = self.try_node_mut(id)?;
        let changed = node.visible != visible;
        node.visible = visible;
        Ok(changed)
    }

    pub fn is_inverted(&self, id: WidgetId) -> bool {
        self.node(id).is_some_and(|node| node.inverted)
    }

    pub(crate) fn set_inverted_flag(&mut self, id: WidgetId, inverted: bool) -> TreeResult<bool> {
        let node = self.try_node_mut(id)?;
        let changed = node.inverted != inverted;
        node.inverted = inverted;
        Ok(changed)
    }

    pub fn parent(&self, id: WidgetId) -> Option<WidgetId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn first_child(&self, id: WidgetId) -> Option<WidgetId> {
        self.node(id).and_then(|node| node.first_child)
    }

    pub fn next_sibling(&self, id: WidgetId) -> Option<WidgetId> {
        self.node(id).and_then(|node| node.next_sibling)
    }

    /// Children of `id`, most recently added first.
    pub fn children(&self, id: WidgetId) -> Children<'_, D> {
        Children {
            tree: self,
            next: self.first_child(id),
        }
    }

    /// True if `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: WidgetId, id: WidgetId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Make `child` the new head of `parent`'s children.
    ///
    /// A child that already has a parent is detached from it first.
    pub fn add_child(&mut self, parent: WidgetId, child: WidgetId) -> TreeResult<()> {
        if !self.exists(parent) {
            return Err(TreeError::UnknownWidget(parent));
        }
        if !self.exists(child) {
            return Err(TreeError::UnknownWidget(child));
        }
        if self.is_ancestor(child, parent) {
            return Err(TreeError::WouldCycle { parent, child });
        }

        self.remove(child)?;

        let parent_node = self.try_node_mut(parent)?;
        let head = parent_node.first_child.replace(child);
        let child_node = self.try_node_mut(child)?;
        child_node.parent = Some(parent);
        child_node.next_sibling = head;
        Ok(())
    }

    /// Detach `id` from its parent, keeping it and its subtree alive.
    ///
    /// No-op for a widget without a parent.
    pub fn remove(&mut self, id: WidgetId) -> TreeResult<()> {
        let node = self.try_node_mut(id)?;
        let Some(parent) = node.parent.take() else {
            return Ok(());
        };
        let next = node.next_sibling.take();

        if self.first_child(parent) == Some(id) {
            self.try_node_mut(parent)?.first_child = next;
            return Ok(());
        }

        let mut current = self.first_child(parent);
        while let Some(sibling) = current {
            let following = self.next_sibling(sibling);
            if following == Some(id) {
                self.try_node_mut(sibling)?.next_sibling = next;
                break;
            }
            current = following;
        }
        Ok(())
    }

    /// Detach `id` and free it together with its whole subtree.
    pub fn destroy(&mut self, id: WidgetId) -> TreeResult<()> {
        self.remove(id)?;

        let mut pending = alloc::vec![id];
        while let Some(current) = pending.pop() {
            pending.extend(self.children(current));
            let slot = &mut self.slots[current.index()];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            self.len -= 1;
        }
        Ok(())
    }

    /// Inclusive point-in-rectangle test on the widget's own area.
    pub fn contains(&self, id: WidgetId, point: Point) -> bool {
        self.node(id).is_some_and(|node| node.area.contains(point))
    }

    /// Deepest visible widget under `point`, searching from `id`.
    ///
    /// `id` itself must be visible and contain the point, otherwise its
    /// children are not looked at. Children are tested most recent first and
    /// the first child subtree that matches wins.
    pub fn match_from(&self, id: WidgetId, point: Point) -> Option<WidgetId> {
        let node = self.node(id)?;
        if !node.visible || !node.area.contains(point) {
            return None;
        }

        let mut child = node.first_child;
        while let Some(current) = child {
            if let Some(hit) = self.match_from(current, point) {
                return Some(hit);
            }
            child = self.next_sibling(current);
        }
        Some(id)
    }

    pub(crate) fn behavior(&self, id: WidgetId) -> Option<&dyn Widget<D>> {
        self.node(id).and_then(|node| node.behavior.as_deref())
    }

    pub(crate) fn take_behavior(&mut self, id: WidgetId) -> Option<Box<dyn Widget<D>>> {
        self.node_mut(id).and_then(|node| node.behavior.take())
    }

    /// Put a checked-out behavior back. Returns false if the widget was
    /// destroyed in the meantime, in which case the behavior is dropped.
    pub(crate) fn restore_behavior(&mut self, id: WidgetId, behavior: Box<dyn Widget<D>>) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.behavior = Some(behavior);
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_redraw_pending(&mut self, id: WidgetId) {
        if let Some(node) = self.node_mut(id) {
            node.redraw_pending = true;
        }
    }

    pub(crate) fn take_redraw_pending(&mut self, id: WidgetId) -> bool {
        self.node_mut(id)
            .is_some_and(|node| core::mem::take(&mut node.redraw_pending))
    }
}

/// Iterator over a widget's children, most recently added first.
pub struct Children<'a, D: Surface> {
    tree: &'a WidgetTree<D>,
    next: Option<WidgetId>,
}

impl<D: Surface> Iterator for Children<'_, D> {
    type Item = WidgetId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.next_sibling(current);
        Some(current)
    }
}

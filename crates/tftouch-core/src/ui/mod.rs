//! Retained-mode widget layer.
//!
//! # Architecture
//!
//! - [`WidgetTree`] owns every widget in a generational arena and answers
//!   spatial queries.
//! - [`Screen`] owns the tree, the display and the deferred event queue, and
//!   routes events up the parent chain.
//! - [`Widget`] is the behavior attached to a tree node: drawing plus a set
//!   of event hooks that default to no-ops.

pub mod colors;
pub mod event;
pub mod screen;
pub mod tree;
pub mod widget;

pub use event::{EventKind, TouchEvent};
pub use screen::{DispatchError, EventContext, LATER_QUEUE_CAPACITY, Screen};
pub use tree::{TreeError, TreeResult, WidgetId, WidgetTree};
pub use widget::Widget;

use core::fmt::Debug;

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;

use crate::geometry::Rotation;

/// Draw target the toolkit renders to.
///
/// `size()` reports the logical (rotated) size. The rotation is needed to map
/// panel-referenced touch coordinates into that logical space.
pub trait Surface: DrawTarget<Color = Rgb565, Error: Debug> + OriginDimensions {
    fn rotation(&self) -> Rotation {
        Rotation::Deg0
    }

    /// Native size of the panel behind the rotation.
    fn panel_size(&self) -> Size {
        self.rotation().panel_size(self.size())
    }
}

#![forbid(unsafe_code)]

//! Scroll node identity and scroll geometry.
//!
//! # Invariants
//!
//! 1. [`ScrollNodeId`] is the only key used to decide controller reuse. It is
//!    stable across geometry refreshes of one document and meaningless across
//!    documents: a navigation allocates a fresh id space.
//! 2. After [`ScrollGeometry::clamp_offset`], the offset lies in
//!    `[0, max(0, scrollable - composition)]` on each axis. Non-finite
//!    components clamp to `0`.

use std::fmt;

use crate::geometry::{Point, Rect, Size};

/// Identifies a sub-scene (for example the frame tree of one process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SceneId(pub u64);

/// Identifies a scrollable region within one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScrollId(pub u64);

impl ScrollId {
    /// First id handed out by scene producers; lower values are reserved.
    pub const START: Self = Self(2);
}

/// Identifies one node of a scene snapshot. Used by tests and tooling to map
/// scene nodes onto hit-test nodes; it plays no part in controller reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LayerId(pub u64);

/// Composite scroll-node identity: `(scene, scroll)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScrollNodeId {
    pub scene: SceneId,
    pub scroll: ScrollId,
}

impl ScrollNodeId {
    #[inline]
    pub const fn new(scene: SceneId, scroll: ScrollId) -> Self {
        Self { scene, scroll }
    }
}

impl fmt::Display for ScrollNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scene.0, self.scroll.0)
    }
}

/// Counter bumped by the authoritative side every time it pushes an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ScrollGeneration(pub u64);

impl ScrollGeneration {
    /// Whether `self` is strictly newer than `seen`.
    #[inline]
    pub fn is_newer_than(self, seen: ScrollGeneration) -> bool {
        self.0 > seen.0
    }
}

/// Who produced the offset carried in a [`ScrollGeometry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateOrigin {
    /// The main thread pushed this offset (a script scroll, anchoring, ...).
    Authoritative,
    /// The offset echoes what the compositor side predicted; only the
    /// rectangles carry new information.
    #[default]
    Compositor,
}

/// Per-node scroll geometry as produced by the scene producer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollGeometry {
    /// Full scrollable content rectangle.
    pub scrollable_rect: Rect,
    /// Viewport through which the content is seen.
    pub composition_bounds: Rect,
    /// Scroll offset of the viewport into the content.
    pub offset: Point,
    pub generation: ScrollGeneration,
    pub origin: UpdateOrigin,
}

impl ScrollGeometry {
    /// Geometry with a zero offset, generation 0, compositor origin.
    pub fn new(scrollable_rect: Rect, composition_bounds: Rect) -> Self {
        Self {
            scrollable_rect,
            composition_bounds,
            ..Self::default()
        }
    }

    /// Builder: set the offset.
    #[must_use]
    pub fn with_offset(mut self, offset: Point) -> Self {
        self.offset = offset;
        self
    }

    /// Builder: mark the offset as an authoritative push at `generation`.
    #[must_use]
    pub fn with_authoritative_offset(mut self, offset: Point, generation: u64) -> Self {
        self.offset = offset;
        self.generation = ScrollGeneration(generation);
        self.origin = UpdateOrigin::Authoritative;
        self
    }

    /// Maximum offset on each axis: `max(0, scrollable - composition)`.
    pub fn scroll_range(&self) -> Size {
        Size::new(
            (self.scrollable_rect.width - self.composition_bounds.width).max(0.0),
            (self.scrollable_rect.height - self.composition_bounds.height).max(0.0),
        )
    }

    /// Clamp `offset` into the scroll range of this geometry.
    pub fn clamp_offset(&self, offset: Point) -> Point {
        let range = self.scroll_range();
        Point::new(clamp_axis(offset.x, range.width), clamp_axis(offset.y, range.height))
    }

    /// Whether `offset` lies inside the scroll range.
    pub fn offset_in_range(&self, offset: Point) -> bool {
        let range = self.scroll_range();
        (0.0..=range.width).contains(&offset.x) && (0.0..=range.height).contains(&offset.y)
    }

    /// Whether both geometries have the same rectangles (offsets and
    /// generations are ignored).
    pub fn same_rects(&self, other: &ScrollGeometry) -> bool {
        self.scrollable_rect == other.scrollable_rect
            && self.composition_bounds == other.composition_bounds
    }
}

#[inline]
fn clamp_axis(value: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0).min(max)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(scrollable: f32, composition: f32) -> ScrollGeometry {
        ScrollGeometry::new(
            Rect::from_size(scrollable, scrollable),
            Rect::from_size(composition, composition),
        )
    }

    #[test]
    fn range_is_content_minus_viewport() {
        let g = geometry(500.0, 200.0);
        assert_eq!(g.scroll_range(), Size::new(300.0, 300.0));
    }

    #[test]
    fn range_never_negative() {
        let g = geometry(100.0, 200.0);
        assert_eq!(g.scroll_range(), Size::new(0.0, 0.0));
        assert_eq!(g.clamp_offset(Point::new(50.0, 50.0)), Point::ZERO);
    }

    #[test]
    fn clamp_limits_both_axes() {
        let g = geometry(500.0, 200.0);
        assert_eq!(g.clamp_offset(Point::new(400.0, -3.0)), Point::new(300.0, 0.0));
        assert_eq!(g.clamp_offset(Point::new(10.0, 20.0)), Point::new(10.0, 20.0));
    }

    #[test]
    fn non_finite_offsets_clamp_to_zero() {
        let g = geometry(500.0, 200.0);
        let p = g.clamp_offset(Point::new(f32::NAN, f32::INFINITY));
        assert_eq!(p, Point::ZERO);
    }

    #[test]
    fn generation_ordering() {
        assert!(ScrollGeneration(2).is_newer_than(ScrollGeneration(1)));
        assert!(!ScrollGeneration(1).is_newer_than(ScrollGeneration(1)));
    }

    #[test]
    fn identity_display() {
        let id = ScrollNodeId::new(SceneId(3), ScrollId(7));
        assert_eq!(id.to_string(), "3:7");
    }
}

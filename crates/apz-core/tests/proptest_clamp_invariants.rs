//! Property tests for the scroll-range clamp.
//!
//! 1. **In range**: any clamped offset lies in `[0, max(0, content - viewport)]`.
//! 2. **Idempotent**: clamping twice equals clamping once.
//! 3. **Identity inside range**: an offset already in range is unchanged.

use apz_core::{Point, Rect, ScrollGeometry};
use proptest::prelude::*;

fn geometry_strategy() -> impl Strategy<Value = ScrollGeometry> {
    (0.0f32..5000.0, 0.0f32..5000.0, 0.0f32..3000.0, 0.0f32..3000.0).prop_map(
        |(sw, sh, cw, ch)| ScrollGeometry::new(Rect::from_size(sw, sh), Rect::from_size(cw, ch)),
    )
}

proptest! {
    #[test]
    fn clamped_offset_is_in_range(
        g in geometry_strategy(),
        x in -10_000.0f32..10_000.0,
        y in -10_000.0f32..10_000.0,
    ) {
        let clamped = g.clamp_offset(Point::new(x, y));
        prop_assert!(g.offset_in_range(clamped), "{clamped:?} outside {:?}", g.scroll_range());
    }

    #[test]
    fn clamp_is_idempotent(
        g in geometry_strategy(),
        x in -10_000.0f32..10_000.0,
        y in -10_000.0f32..10_000.0,
    ) {
        let once = g.clamp_offset(Point::new(x, y));
        prop_assert_eq!(g.clamp_offset(once), once);
    }

    #[test]
    fn in_range_offsets_are_untouched(g in geometry_strategy(), fx in 0.0f32..=1.0, fy in 0.0f32..=1.0) {
        let range = g.scroll_range();
        let p = Point::new(range.width * fx, range.height * fy);
        prop_assert_eq!(g.clamp_offset(p), p);
    }
}

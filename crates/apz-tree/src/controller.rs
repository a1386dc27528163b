#![forbid(unsafe_code)]

//! Per-region scroll controller.
//!
//! A [`ScrollController`] owns the composited offset of one scrollable
//! region together with the transient state of the gesture currently driving
//! it: the pan anchor, a velocity estimate, and a [`TapDetector`].
//!
//! # Invariants
//!
//! 1. The composited offset lies in `[0, max(0, scrollable - composition)]`
//!    on both axes after every mutation, whether the mutation came from
//!    input, a geometry refresh, or an authoritative push.
//! 2. `state_generation` increases every time the composited offset changes
//!    and never otherwise.
//! 3. An authoritative offset is adopted only when its scroll generation is
//!    strictly newer than the last one seen, or on a first paint. It is
//!    clamped after adoption.
//!
//! # Design Notes
//!
//! The controller knows nothing about blocks beyond the id stamped on it as
//! its active gesture. Routing, buffering, and handoff to the parent chain are
//! the tree manager's job; the controller only reports the delta it could not
//! consume.

use apz_core::{
    GestureConfig, Point, ScrollGeneration, ScrollGeometry, ScrollNodeId, TapDetector, TapEvent,
    UpdateOrigin,
};
use web_time::Instant;

use crate::input_block::BlockId;
use crate::registry::ControllerHandle;

// ---------------------------------------------------------------------------
// Gesture input
// ---------------------------------------------------------------------------

/// Controller-level gesture input derived from raw events.
///
/// Touch and pointer streams become contact inputs addressed by their focus
/// point (the centroid of every active contact); wheel events become plain
/// scroll deltas.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureInput {
    /// The set of contacts changed by adding one or more contacts.
    ContactStart {
        focus: Point,
        contacts: usize,
        time: Instant,
    },
    /// Contacts moved.
    ContactMove { focus: Point, time: Instant },
    /// One or more contacts lifted. `focus` is the centroid of the contacts
    /// still down, if any.
    ContactEnd {
        focus: Option<Point>,
        remaining: usize,
        time: Instant,
    },
    /// The contact sequence was aborted.
    ContactCancel,
    /// A scroll delta in content pixels (positive `y` scrolls down).
    Scroll { delta: Point },
}

impl GestureInput {
    /// Whether this input opens a contact gesture on the receiver. Scroll
    /// deltas carry no gesture state and never claim the receiver.
    #[inline]
    pub fn begins_gesture(&self) -> bool {
        matches!(self, Self::ContactStart { .. })
    }
}

/// What a controller did with one [`GestureInput`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputOutcome {
    /// Delta applied to this controller's offset.
    pub consumed: Point,
    /// Delta left over for the parent chain.
    pub overscroll: Point,
    /// Tap recognized by this input, if any.
    pub tap: Option<TapEvent>,
}

/// Offset plus the authoritative generation it was taken under.
///
/// Used to undo speculative input when a block is retargeted or consumed by
/// content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetSnapshot {
    pub offset: Point,
    pub generation: ScrollGeneration,
}

#[derive(Debug, Clone, Copy)]
struct PanAnchor {
    focus: Point,
    time: Instant,
}

// ---------------------------------------------------------------------------
// ScrollController
// ---------------------------------------------------------------------------

/// Stateful controller for one scroll node identity.
#[derive(Debug, Clone)]
pub struct ScrollController {
    id: ScrollNodeId,
    geometry: ScrollGeometry,
    last_generation: ScrollGeneration,
    is_root_content: bool,
    parent: Option<ControllerHandle>,
    /// Pixels per millisecond, content direction.
    velocity: Point,
    state_generation: u64,
    pan: Option<PanAnchor>,
    taps: TapDetector,
    active_block: Option<BlockId>,
}

impl ScrollController {
    /// Create a controller seeded from `hint`. The hinted offset is adopted
    /// and clamped.
    pub fn new(
        id: ScrollNodeId,
        hint: &ScrollGeometry,
        is_root_content: bool,
        gesture: GestureConfig,
    ) -> Self {
        let mut geometry = *hint;
        geometry.offset = hint.clamp_offset(hint.offset);
        Self {
            id,
            geometry,
            last_generation: hint.generation,
            is_root_content,
            parent: None,
            velocity: Point::ZERO,
            state_generation: 0,
            pan: None,
            taps: TapDetector::new(gesture),
            active_block: None,
        }
    }

    #[inline]
    pub fn id(&self) -> ScrollNodeId {
        self.id
    }

    /// Current geometry; its offset is the composited offset.
    #[inline]
    pub fn geometry(&self) -> &ScrollGeometry {
        &self.geometry
    }

    /// Current offset, already clamped. Pure.
    #[inline]
    pub fn composited_offset(&self) -> Point {
        self.geometry.offset
    }

    #[inline]
    pub fn velocity(&self) -> Point {
        self.velocity
    }

    #[inline]
    pub fn state_generation(&self) -> u64 {
        self.state_generation
    }

    /// Last authoritative scroll generation adopted.
    #[inline]
    pub fn last_generation(&self) -> ScrollGeneration {
        self.last_generation
    }

    #[inline]
    pub fn is_root_content(&self) -> bool {
        self.is_root_content
    }

    /// Nearest ancestor controller, used for scroll handoff.
    #[inline]
    pub fn parent(&self) -> Option<ControllerHandle> {
        self.parent
    }

    /// Block whose gesture currently drives this controller.
    #[inline]
    pub fn active_block(&self) -> Option<BlockId> {
        self.active_block
    }

    /// Whether any gesture state is live (active block, pan anchor, or a
    /// contact tracked by the tap detector).
    pub fn has_gesture_state(&self) -> bool {
        self.active_block.is_some() || self.pan.is_some() || self.taps.is_tracking()
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ControllerHandle>) {
        self.parent = parent;
    }

    pub(crate) fn set_root_content(&mut self, is_root_content: bool) {
        self.is_root_content = is_root_content;
    }

    pub(crate) fn set_gesture_config(&mut self, config: GestureConfig) {
        self.taps.set_config(config);
    }

    pub(crate) fn set_active_block(&mut self, block: BlockId) {
        self.active_block = Some(block);
    }

    /// Clear gesture state owned by `block`, or left with no owner.
    pub(crate) fn release_gesture(&mut self, block: BlockId) {
        if self.active_block.is_none_or(|active| active == block) {
            self.clear_gesture_state();
        }
    }

    /// Drop the active-block stamp if it names `block`.
    pub(crate) fn release_block(&mut self, block: BlockId) {
        if self.active_block == Some(block) {
            self.active_block = None;
        }
    }

    // -- geometry ----------------------------------------------------------

    /// Apply the geometry carried by a scene snapshot.
    ///
    /// Returns `true` when the composited offset changed.
    pub fn apply_geometry_update(&mut self, update: &ScrollGeometry, is_first_paint: bool) -> bool {
        let before = self.geometry.offset;
        let adopt = is_first_paint
            || (update.origin == UpdateOrigin::Authoritative
                && update.generation.is_newer_than(self.last_generation));

        let offset = if adopt { update.offset } else { before };
        self.geometry.scrollable_rect = update.scrollable_rect;
        self.geometry.composition_bounds = update.composition_bounds;
        self.geometry.origin = update.origin;
        if adopt {
            self.last_generation = self.last_generation.max(update.generation);
            self.geometry.generation = self.last_generation;
            self.velocity = Point::ZERO;
        }
        self.set_offset(offset);

        tracing::trace!(
            message = "apz.controller.geometry",
            id = %self.id,
            adopted = adopt,
            x = self.geometry.offset.x,
            y = self.geometry.offset.y
        );
        self.geometry.offset != before
    }

    /// Adopt an authoritative offset pushed outside a scene snapshot.
    ///
    /// Returns `false` (and changes nothing) when `generation` is not newer
    /// than the last one seen.
    pub fn push_authoritative_offset(&mut self, offset: Point, generation: ScrollGeneration) -> bool {
        if !generation.is_newer_than(self.last_generation) {
            return false;
        }
        self.last_generation = generation;
        self.geometry.generation = generation;
        self.geometry.origin = UpdateOrigin::Authoritative;
        self.velocity = Point::ZERO;
        self.set_offset(offset);
        true
    }

    /// Force a compositor-side offset. Clamped; the scroll generation is
    /// untouched.
    pub fn set_async_offset(&mut self, offset: Point) -> bool {
        let before = self.geometry.offset;
        self.set_offset(offset);
        self.geometry.offset != before
    }

    pub fn snapshot(&self) -> OffsetSnapshot {
        OffsetSnapshot {
            offset: self.geometry.offset,
            generation: self.last_generation,
        }
    }

    /// Undo speculative scrolling back to `snapshot`.
    ///
    /// Skipped when an authoritative offset was adopted since the snapshot
    /// was taken; that offset wins. Returns `true` when the offset changed.
    pub fn restore(&mut self, snapshot: &OffsetSnapshot) -> bool {
        if self.last_generation != snapshot.generation {
            return false;
        }
        self.velocity = Point::ZERO;
        self.set_async_offset(snapshot.offset)
    }

    // -- input -------------------------------------------------------------

    /// Apply one gesture input.
    pub fn consume_input(&mut self, input: &GestureInput) -> InputOutcome {
        match *input {
            GestureInput::ContactStart {
                focus,
                contacts,
                time,
            } => {
                match self.pan.as_mut() {
                    Some(anchor) => {
                        anchor.focus = focus;
                        anchor.time = time;
                    }
                    None => {
                        self.taps.on_down(focus, time);
                        self.pan = Some(PanAnchor { focus, time });
                        self.velocity = Point::ZERO;
                    }
                }
                if contacts > 1 {
                    self.taps.on_additional_contact();
                }
                InputOutcome::default()
            }
            GestureInput::ContactMove { focus, time } => {
                let Some(anchor) = self.pan else {
                    self.pan = Some(PanAnchor { focus, time });
                    return InputOutcome::default();
                };
                if !self.taps.on_move(focus) {
                    return InputOutcome::default();
                }
                let delta = anchor.focus - focus;
                let outcome = self.pan_by(delta);
                let elapsed_ms = time.saturating_duration_since(anchor.time).as_secs_f32() * 1000.0;
                if elapsed_ms > 0.0 {
                    self.velocity = outcome.consumed.scale(1.0 / elapsed_ms);
                }
                self.pan = Some(PanAnchor { focus, time });
                outcome
            }
            GestureInput::ContactEnd {
                focus,
                remaining,
                time,
            } => {
                if remaining > 0 {
                    if let (Some(anchor), Some(focus)) = (self.pan.as_mut(), focus) {
                        anchor.focus = focus;
                        anchor.time = time;
                    }
                    return InputOutcome::default();
                }
                let tap = self.taps.on_up(time);
                self.pan = None;
                self.active_block = None;
                InputOutcome {
                    tap,
                    ..InputOutcome::default()
                }
            }
            GestureInput::ContactCancel => {
                self.clear_gesture_state();
                InputOutcome::default()
            }
            GestureInput::Scroll { delta } => self.pan_by(delta),
        }
    }

    /// Scroll by `delta`, returning the part that could not be consumed.
    pub fn scroll_by(&mut self, delta: Point) -> Point {
        self.pan_by(delta).overscroll
    }

    fn pan_by(&mut self, delta: Point) -> InputOutcome {
        if !delta.is_finite() {
            return InputOutcome::default();
        }
        let before = self.geometry.offset;
        self.set_offset(before + delta);
        let consumed = self.geometry.offset - before;
        InputOutcome {
            consumed,
            overscroll: delta - consumed,
            tap: None,
        }
    }

    /// Poll the long-press timer.
    pub fn check_long_press(&mut self, now: Instant) -> Option<TapEvent> {
        self.taps.check_long_press(now)
    }

    /// Whether the tap detector is waiting on a held contact.
    pub fn is_tracking_contact(&self) -> bool {
        self.taps.is_tracking()
    }

    /// Release all transient gesture state. Nothing fires afterwards for
    /// the aborted sequence.
    pub fn clear_gesture_state(&mut self) {
        self.taps.reset();
        self.pan = None;
        self.velocity = Point::ZERO;
        self.active_block = None;
    }

    fn set_offset(&mut self, offset: Point) {
        let clamped = self.geometry.clamp_offset(offset);
        if clamped != self.geometry.offset {
            self.geometry.offset = clamped;
            self.state_generation += 1;
        }
        debug_assert!(self.geometry.offset_in_range(self.geometry.offset));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use apz_core::{Rect, SceneId, ScrollId};
    use web_time::Duration;

    fn id() -> ScrollNodeId {
        ScrollNodeId::new(SceneId(1), ScrollId::START)
    }

    fn geometry(scrollable: f32, composition: f32) -> ScrollGeometry {
        ScrollGeometry::new(
            Rect::from_size(scrollable, scrollable),
            Rect::from_size(composition, composition),
        )
    }

    fn controller() -> ScrollController {
        ScrollController::new(id(), &geometry(500.0, 200.0), false, GestureConfig::default())
    }

    fn pushed_to_300() -> ScrollController {
        let mut c = controller();
        let update = geometry(500.0, 200.0).with_authoritative_offset(Point::new(300.0, 300.0), 1);
        assert!(c.apply_geometry_update(&update, false));
        assert_eq!(c.composited_offset(), Point::new(300.0, 300.0));
        c
    }

    #[test]
    fn seed_offset_is_clamped() {
        let hint = geometry(500.0, 200.0).with_offset(Point::new(900.0, -5.0));
        let c = ScrollController::new(id(), &hint, true, GestureConfig::default());
        assert_eq!(c.composited_offset(), Point::new(300.0, 0.0));
        assert!(c.is_root_content());
    }

    #[test]
    fn clamp_on_shrink() {
        let mut c = pushed_to_300();
        let shrunk = ScrollGeometry::new(Rect::from_size(400.0, 400.0), Rect::from_size(200.0, 200.0))
            .with_authoritative_offset(Point::new(300.0, 300.0), 1);
        c.apply_geometry_update(&shrunk, false);
        assert_eq!(c.composited_offset(), Point::new(200.0, 200.0));
    }

    #[test]
    fn clamp_on_grow_viewport() {
        let mut c = pushed_to_300();
        let grown = geometry(500.0, 300.0);
        c.apply_geometry_update(&grown, false);
        assert_eq!(c.composited_offset(), Point::new(200.0, 200.0));
    }

    #[test]
    fn stale_generation_keeps_composited_offset() {
        let mut c = pushed_to_300();
        let stale = geometry(500.0, 200.0).with_authoritative_offset(Point::new(10.0, 10.0), 1);
        assert!(!c.apply_geometry_update(&stale, false));
        assert_eq!(c.composited_offset(), Point::new(300.0, 300.0));
    }

    #[test]
    fn authoritative_offset_is_clamped_after_adoption() {
        let mut c = controller();
        let update = geometry(400.0, 200.0).with_authoritative_offset(Point::new(300.0, 50.0), 4);
        c.apply_geometry_update(&update, false);
        assert_eq!(c.composited_offset(), Point::new(200.0, 50.0));
        assert_eq!(c.last_generation(), ScrollGeneration(4));
    }

    #[test]
    fn first_paint_adopts_without_generation() {
        let mut c = pushed_to_300();
        let update = geometry(500.0, 200.0).with_offset(Point::new(20.0, 30.0));
        assert!(c.apply_geometry_update(&update, true));
        assert_eq!(c.composited_offset(), Point::new(20.0, 30.0));
        // Adoption does not rewind the generation.
        assert_eq!(c.last_generation(), ScrollGeneration(1));
    }

    #[test]
    fn push_requires_newer_generation() {
        let mut c = controller();
        assert!(c.push_authoritative_offset(Point::new(50.0, 60.0), ScrollGeneration(2)));
        assert!(!c.push_authoritative_offset(Point::new(1.0, 1.0), ScrollGeneration(2)));
        assert_eq!(c.composited_offset(), Point::new(50.0, 60.0));
        assert!(c.push_authoritative_offset(Point::new(999.0, 1.0), ScrollGeneration(3)));
        assert_eq!(c.composited_offset(), Point::new(300.0, 1.0));
    }

    #[test]
    fn state_generation_tracks_offset_changes() {
        let mut c = controller();
        assert_eq!(c.state_generation(), 0);
        c.set_async_offset(Point::new(10.0, 0.0));
        assert_eq!(c.state_generation(), 1);
        c.set_async_offset(Point::new(10.0, 0.0));
        assert_eq!(c.state_generation(), 1);
    }

    #[test]
    fn scroll_reports_overscroll_at_edge() {
        let mut c = controller();
        let left = c.scroll_by(Point::new(0.0, 350.0));
        assert_eq!(c.composited_offset(), Point::new(0.0, 300.0));
        assert_eq!(left, Point::new(0.0, 50.0));
        let left = c.scroll_by(Point::new(-10.0, 0.0));
        assert_eq!(left, Point::new(-10.0, 0.0));
    }

    #[test]
    fn non_finite_delta_is_ignored() {
        let mut c = controller();
        let outcome = c.consume_input(&GestureInput::Scroll {
            delta: Point::new(f32::NAN, 1.0),
        });
        assert_eq!(outcome, InputOutcome::default());
        assert_eq!(c.composited_offset(), Point::ZERO);
    }

    #[test]
    fn drag_pans_opposite_to_finger() {
        let mut c = controller();
        let t = Instant::now();
        c.consume_input(&GestureInput::ContactStart {
            focus: Point::new(100.0, 150.0),
            contacts: 1,
            time: t,
        });
        let out = c.consume_input(&GestureInput::ContactMove {
            focus: Point::new(100.0, 100.0),
            time: t + Duration::from_millis(10),
        });
        assert_eq!(out.consumed, Point::new(0.0, 50.0));
        assert_eq!(c.composited_offset(), Point::new(0.0, 50.0));
        assert!(c.velocity().y > 0.0);

        let end = c.consume_input(&GestureInput::ContactEnd {
            focus: None,
            remaining: 0,
            time: t + Duration::from_millis(20),
        });
        assert!(end.tap.is_none());
        assert!(!c.has_gesture_state());
    }

    #[test]
    fn small_movement_does_not_scroll() {
        let mut c = controller();
        let t = Instant::now();
        c.consume_input(&GestureInput::ContactStart {
            focus: Point::new(10.0, 10.0),
            contacts: 1,
            time: t,
        });
        let out = c.consume_input(&GestureInput::ContactMove {
            focus: Point::new(10.0, 7.0),
            time: t,
        });
        assert_eq!(out.consumed, Point::ZERO);
        let end = c.consume_input(&GestureInput::ContactEnd {
            focus: None,
            remaining: 0,
            time: t + Duration::from_millis(30),
        });
        assert_eq!(end.tap.map(|tap| tap.kind), Some(apz_core::TapKind::SingleTap));
    }

    #[test]
    fn clear_gesture_state_silences_long_press() {
        let mut c = controller();
        let t = Instant::now();
        c.set_active_block(BlockId(1));
        c.consume_input(&GestureInput::ContactStart {
            focus: Point::new(10.0, 10.0),
            contacts: 1,
            time: t,
        });
        c.clear_gesture_state();
        assert!(c.check_long_press(t + Duration::from_secs(2)).is_none());
        assert!(c.active_block().is_none());
    }

    #[test]
    fn restore_skips_after_authoritative_push() {
        let mut c = controller();
        let snap = c.snapshot();
        c.scroll_by(Point::new(0.0, 40.0));
        assert!(c.restore(&snap));
        assert_eq!(c.composited_offset(), Point::ZERO);

        let snap = c.snapshot();
        c.scroll_by(Point::new(0.0, 40.0));
        c.push_authoritative_offset(Point::new(0.0, 100.0), ScrollGeneration(1));
        assert!(!c.restore(&snap));
        assert_eq!(c.composited_offset(), Point::new(0.0, 100.0));
    }

    #[test]
    fn release_block_only_matches_own_block() {
        let mut c = controller();
        c.set_active_block(BlockId(3));
        c.release_block(BlockId(2));
        assert_eq!(c.active_block(), Some(BlockId(3)));
        c.release_block(BlockId(3));
        assert_eq!(c.active_block(), None);
    }
}

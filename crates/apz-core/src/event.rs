#![forbid(unsafe_code)]

//! Canonical input event types.
//!
//! Raw pointer, touch, and wheel events as delivered by the input collaborator,
//! in device coordinates with a monotonic timestamp.
//!
//! # Design Notes
//!
//! - A touch `Start` lists every touch currently down, new and old alike; the
//!   engine works out which ids are new. `Move` lists every active touch.
//!   `End` and `Cancel` list only the touches that lifted.
//! - Wheel deltas are in the direction the content should move under the
//!   viewport: positive `y` scrolls down.
//! - `Modifiers` use bitflags for easy combination.

use bitflags::bitflags;
use smallvec::SmallVec;
use web_time::Instant;

use crate::geometry::Point;

/// Canonical input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Touch(TouchEvent),
    Wheel(WheelEvent),
    Pointer(PointerEvent),
}

impl InputEvent {
    /// When the event was generated.
    pub fn timestamp(&self) -> Instant {
        match self {
            Self::Touch(t) => t.timestamp,
            Self::Wheel(w) => w.timestamp,
            Self::Pointer(p) => p.timestamp,
        }
    }

    /// Short name used in log fields.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Touch(_) => "touch",
            Self::Wheel(_) => "wheel",
            Self::Pointer(_) => "pointer",
        }
    }
}

/// Identifier of one touch point or pointer device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PointerId(pub u32);

/// One finger of a touch event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub id: PointerId,
    pub point: Point,
}

/// Phase of a touch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// A multi-touch event.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub touches: SmallVec<[TouchPoint; 4]>,
    pub modifiers: Modifiers,
    pub timestamp: Instant,
}

impl TouchEvent {
    /// Create an event with no touches; add them with [`with_touch`](Self::with_touch).
    #[must_use]
    pub fn new(phase: TouchPhase, timestamp: Instant) -> Self {
        Self {
            phase,
            touches: SmallVec::new(),
            modifiers: Modifiers::NONE,
            timestamp,
        }
    }

    /// Append a touch point.
    #[must_use]
    pub fn with_touch(mut self, id: u32, point: Point) -> Self {
        self.touches.push(TouchPoint {
            id: PointerId(id),
            point,
        });
        self
    }

    /// Look up a touch by id.
    pub fn touch(&self, id: PointerId) -> Option<&TouchPoint> {
        self.touches.iter().find(|t| t.id == id)
    }

    /// Average position of all touches in this event.
    pub fn focus(&self) -> Option<Point> {
        Point::centroid(self.touches.iter().map(|t| t.point))
    }
}

/// How wheel deltas are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WheelDeltaMode {
    /// Deltas are device pixels.
    #[default]
    Pixel,
    /// Deltas are lines; the engine scales them by its configured line height.
    Line,
}

/// A wheel or trackpad scroll event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    /// Pointer position when the wheel moved.
    pub point: Point,
    pub delta: Point,
    pub mode: WheelDeltaMode,
    pub modifiers: Modifiers,
    pub timestamp: Instant,
}

impl WheelEvent {
    /// Create a pixel-mode wheel event with no modifiers.
    #[must_use]
    pub fn new(point: Point, delta: Point, timestamp: Instant) -> Self {
        Self {
            point,
            delta,
            mode: WheelDeltaMode::Pixel,
            modifiers: Modifiers::NONE,
            timestamp,
        }
    }

    /// Create a wheel event with a specific delta mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: WheelDeltaMode) -> Self {
        self.mode = mode;
        self
    }

    /// Create a wheel event with modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Kind of a pointer (mouse or pen) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Down,
    Move,
    Up,
}

/// A mouse or pen event that drives drag-to-pan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub id: PointerId,
    pub point: Point,
    pub modifiers: Modifiers,
    pub timestamp: Instant,
}

impl PointerEvent {
    #[must_use]
    pub fn new(kind: PointerKind, point: Point, timestamp: Instant) -> Self {
        Self {
            kind,
            id: PointerId(0),
            point,
            modifiers: Modifiers::NONE,
            timestamp,
        }
    }
}

bitflags! {
    /// Modifier keys held during an input event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift key. Swaps wheel axes.
        const SHIFT = 0b0001;
        /// Alt/Option key.
        const ALT   = 0b0010;
        /// Control key.
        const CTRL  = 0b0100;
        /// Super/Meta/Command key.
        const SUPER = 0b1000;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<TouchEvent> for InputEvent {
    fn from(event: TouchEvent) -> Self {
        Self::Touch(event)
    }
}

impl From<WheelEvent> for InputEvent {
    fn from(event: WheelEvent) -> Self {
        Self::Wheel(event)
    }
}

impl From<PointerEvent> for InputEvent {
    fn from(event: PointerEvent) -> Self {
        Self::Pointer(event)
    }
}

#![forbid(unsafe_code)]

//! Tap and long-press detection for one scroll controller.
//!
//! [`TapDetector`] watches the contact sequence a controller receives and
//! reports [`TapKind::SingleTap`] on release or [`TapKind::LongTap`] when a
//! contact is held still past the threshold.
//!
//! # State Machine
//!
//! ```text
//!  Idle --down--> Tracking --move beyond slop--> Panning (no taps)
//!                    |  \--second contact-----> MultiTouch (no taps)
//!                    |--held >= threshold-----> LongTap fired (no SingleTap)
//!                    \--up--------------------> SingleTap, back to Idle
//! ```
//!
//! # Invariants
//!
//! 1. At most one `LongTap` per contact sequence.
//! 2. `SingleTap` and `LongTap` never both fire for one contact sequence.
//! 3. After `reset()`, nothing fires until the next `on_down`.

use web_time::{Duration, Instant};

use crate::geometry::Point;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Thresholds for tap recognition.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureConfig {
    /// Duration before a stationary contact triggers a long tap (default: 500ms).
    pub long_press_threshold: Duration,
    /// Movement (px) a contact may make before it counts as a pan (default: 8.0).
    pub touch_slop: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press_threshold: Duration::from_millis(500),
            touch_slop: 8.0,
        }
    }
}

/// Which tap was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapKind {
    SingleTap,
    LongTap,
}

/// A recognized tap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapEvent {
    pub kind: TapKind,
    /// Where the contact went down.
    pub point: Point,
    /// How long the contact had been down when the tap fired.
    pub held: Duration,
}

// ---------------------------------------------------------------------------
// TapDetector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Contact {
    start: Point,
    down_at: Instant,
    moved: bool,
    multi: bool,
    long_press_fired: bool,
}

/// Per-controller tap recognizer.
#[derive(Debug, Clone)]
pub struct TapDetector {
    config: GestureConfig,
    contact: Option<Contact>,
}

impl TapDetector {
    #[must_use]
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            contact: None,
        }
    }

    /// First contact of a sequence went down.
    pub fn on_down(&mut self, point: Point, now: Instant) {
        self.contact = Some(Contact {
            start: point,
            down_at: now,
            moved: false,
            multi: false,
            long_press_fired: false,
        });
    }

    /// A further contact joined; taps are no longer possible for this sequence.
    pub fn on_additional_contact(&mut self) {
        if let Some(contact) = self.contact.as_mut() {
            contact.multi = true;
        }
    }

    /// Contact moved. Returns `true` once movement has exceeded the slop,
    /// meaning the sequence is a pan.
    pub fn on_move(&mut self, point: Point) -> bool {
        let slop = self.config.touch_slop;
        match self.contact.as_mut() {
            Some(contact) => {
                if !contact.moved && contact.start.distance(point) > slop {
                    contact.moved = true;
                }
                contact.moved
            }
            None => true,
        }
    }

    /// Last contact lifted.
    pub fn on_up(&mut self, now: Instant) -> Option<TapEvent> {
        let contact = self.contact.take()?;
        if contact.moved || contact.multi || contact.long_press_fired {
            return None;
        }
        Some(TapEvent {
            kind: TapKind::SingleTap,
            point: contact.start,
            held: now.saturating_duration_since(contact.down_at),
        })
    }

    /// Check for long press timeout. Call periodically (e.g., once per frame).
    pub fn check_long_press(&mut self, now: Instant) -> Option<TapEvent> {
        let threshold = self.config.long_press_threshold;
        let contact = self.contact.as_mut()?;
        if contact.long_press_fired || contact.moved || contact.multi {
            return None;
        }
        let held = now.saturating_duration_since(contact.down_at);
        if held < threshold {
            return None;
        }
        contact.long_press_fired = true;
        Some(TapEvent {
            kind: TapKind::LongTap,
            point: contact.start,
            held,
        })
    }

    /// Whether a contact sequence is being tracked.
    #[inline]
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.contact.is_some()
    }

    /// Whether the tracked sequence has turned into a pan.
    #[inline]
    #[must_use]
    pub fn is_panning(&self) -> bool {
        self.contact.as_ref().is_some_and(|c| c.moved)
    }

    /// Forget the current sequence without emitting anything.
    pub fn reset(&mut self) {
        self.contact = None;
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GestureConfig) {
        self.config = config;
    }
}

impl Default for TapDetector {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

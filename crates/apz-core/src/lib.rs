#![forbid(unsafe_code)]

//! Core: geometry, scroll identity, input events, and tap detection.
//!
//! # Role in the workspace
//! `apz-core` is the shared vocabulary. It owns the value types that cross
//! between the control context (scene producer, main thread) and the
//! render/input context: rectangles, scroll-node identities, scroll geometry
//! with its clamping rule, and canonical input events.
//!
//! # How it fits in the system
//! `apz-tree` builds the controller/hit-test engine on these types and
//! `apz-runtime` moves them across threads. Nothing here allocates threads or
//! touches global state.

pub mod event;
pub mod geometry;
pub mod gesture;
pub mod scroll;

pub use event::{
    InputEvent, Modifiers, PointerEvent, PointerId, PointerKind, TouchEvent, TouchPhase,
    TouchPoint, WheelDeltaMode, WheelEvent,
};
pub use geometry::{Point, Rect, Size};
pub use gesture::{GestureConfig, TapDetector, TapEvent, TapKind};
pub use scroll::{
    LayerId, SceneId, ScrollGeneration, ScrollGeometry, ScrollId, ScrollNodeId, UpdateOrigin,
};

#![forbid(unsafe_code)]

//! Outbound notifications to the content side.
//!
//! The tree manager reports recognized taps and asks for repaints through a
//! [`ContentController`]. Calls happen on the render/input context while the
//! manager is mid-operation, so implementations must return quickly and must
//! not call back into the manager.

use std::sync::{Mutex, PoisonError};

use apz_core::{Point, ScrollNodeId, TapKind};

use crate::input_block::BlockId;

/// Receiver of gesture notifications.
pub trait ContentController: Send + Sync {
    /// A tap was recognized on `target` within `block`.
    fn handle_tap(&self, kind: TapKind, point: Point, target: ScrollNodeId, block: BlockId);

    /// Input moved `target` to `offset`; content should repaint around it.
    fn request_content_repaint(&self, target: ScrollNodeId, offset: Point, state_generation: u64);
}

/// Value form of a [`ContentController`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentNotification {
    Tap {
        kind: TapKind,
        point: Point,
        target: ScrollNodeId,
        block: BlockId,
    },
    Repaint {
        target: ScrollNodeId,
        offset: Point,
        state_generation: u64,
    },
}

impl ContentNotification {
    pub fn target(&self) -> ScrollNodeId {
        match self {
            Self::Tap { target, .. } | Self::Repaint { target, .. } => *target,
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContentController;

impl ContentController for NoopContentController {
    fn handle_tap(&self, _kind: TapKind, _point: Point, _target: ScrollNodeId, _block: BlockId) {}

    fn request_content_repaint(&self, _target: ScrollNodeId, _offset: Point, _generation: u64) {}
}

/// Keeps every notification in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingContentController {
    notices: Mutex<Vec<ContentNotification>>,
}

impl RecordingContentController {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, notice: ContentNotification) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<ContentNotification> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Recorded taps as `(kind, target)` pairs, without draining.
    pub fn taps(&self) -> Vec<(TapKind, ScrollNodeId)> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|n| match n {
                ContentNotification::Tap { kind, target, .. } => Some((*kind, *target)),
                ContentNotification::Repaint { .. } => None,
            })
            .collect()
    }
}

impl ContentController for RecordingContentController {
    fn handle_tap(&self, kind: TapKind, point: Point, target: ScrollNodeId, block: BlockId) {
        self.push(ContentNotification::Tap {
            kind,
            point,
            target,
            block,
        });
    }

    fn request_content_repaint(&self, target: ScrollNodeId, offset: Point, state_generation: u64) {
        self.push(ContentNotification::Repaint {
            target,
            offset,
            state_generation,
        });
    }
}

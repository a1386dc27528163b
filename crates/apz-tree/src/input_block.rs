#![forbid(unsafe_code)]

//! Input block bookkeeping.
//!
//! An [`InputBlock`] is one gesture: a touch sequence from first finger down
//! to last finger up, a wheel transaction, or a pointer drag. The tracker
//! hands out monotonically increasing [`BlockId`]s and keeps each block until
//! it is both finished and resolved.
//!
//! # State Machine
//!
//! ```text
//!  Pending --confirm(same target)------------------------> Confirmed
//!     |----confirm(other target)--> Overridden --replay--> Confirmed
//!     \----timeout-------------------------------------> Confirmed (provisional)
//! ```
//!
//! Blocks whose hit did not require confirmation start out `Confirmed`.
//!
//! # Invariants
//!
//! 1. Block ids are never reused.
//! 2. Only `Pending` blocks buffer events.
//! 3. At most one unfinished block per [`BlockKind`] is active at a time.

use std::collections::BTreeMap;
use std::fmt;

use apz_core::{Point, PointerId, ScrollNodeId, TapEvent, TouchPoint};
use smallvec::SmallVec;
use web_time::{Duration, Instant};

use crate::controller::{GestureInput, OffsetSnapshot};
use crate::registry::ControllerHandle;

/// Identifier of one input block. Ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which input stream a block groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Touch,
    Wheel,
    Pointer,
}

impl BlockKind {
    const ALL: [BlockKind; 3] = [BlockKind::Touch, BlockKind::Wheel, BlockKind::Pointer];

    fn slot(self) -> usize {
        match self {
            Self::Touch => 0,
            Self::Wheel => 1,
            Self::Pointer => 2,
        }
    }
}

/// Target confirmation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// Running speculatively against the provisional target.
    Pending,
    /// The confirmed target differs; replay is in progress.
    Overridden,
    /// Target final.
    Confirmed,
}

/// One in-flight gesture.
#[derive(Debug, Clone)]
pub struct InputBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Contacts currently down, with their last known position.
    pub contacts: SmallVec<[TouchPoint; 4]>,
    /// Target chosen by hit testing when the block started.
    pub provisional: Option<ControllerHandle>,
    /// Controller currently receiving the block's input.
    pub target: Option<ControllerHandle>,
    pub state: BlockState,
    /// Gesture inputs applied while pending, for replay on override.
    pub buffered: Vec<GestureInput>,
    /// Taps recognized while pending, delivered on confirmation.
    pub deferred_taps: Vec<(ScrollNodeId, TapEvent)>,
    /// Offset of every controller this block moved, taken before the block
    /// first touched it, in touch order.
    pub rollback: SmallVec<[(ControllerHandle, OffsetSnapshot); 4]>,
    pub created_at: Instant,
    pub last_event_at: Instant,
    /// No more events will arrive.
    pub finished: bool,
    /// A multi-touch retarget fixed the target; confirmation no longer moves it.
    pub target_locked: bool,
    /// Content prevented default; the block's events are dropped.
    pub consumed_by_content: bool,
}

impl InputBlock {
    fn new(id: BlockId, kind: BlockKind, target: Option<ControllerHandle>, now: Instant) -> Self {
        Self {
            id,
            kind,
            contacts: SmallVec::new(),
            provisional: target,
            target,
            state: BlockState::Pending,
            buffered: Vec::new(),
            deferred_taps: Vec::new(),
            rollback: SmallVec::new(),
            created_at: now,
            last_event_at: now,
            finished: false,
            target_locked: false,
            consumed_by_content: false,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state == BlockState::Pending
    }

    /// Finished and resolved, so nothing can happen to it any more.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.finished && self.state == BlockState::Confirmed
    }

    /// Record or update a contact position. Returns `true` if the contact
    /// is new to this block.
    pub fn upsert_contact(&mut self, touch: TouchPoint) -> bool {
        match self.contacts.iter_mut().find(|c| c.id == touch.id) {
            Some(existing) => {
                existing.point = touch.point;
                false
            }
            None => {
                self.contacts.push(touch);
                true
            }
        }
    }

    pub fn remove_contact(&mut self, id: PointerId) {
        self.contacts.retain(|c| c.id != id);
    }

    pub fn has_contact(&self, id: PointerId) -> bool {
        self.contacts.iter().any(|c| c.id == id)
    }

    /// Keep `snapshot` as the rollback point for `handle` unless one is
    /// already held.
    pub fn remember(&mut self, handle: ControllerHandle, snapshot: OffsetSnapshot) {
        if !self.rollback.iter().any(|(h, _)| *h == handle) {
            self.rollback.push((handle, snapshot));
        }
    }

    /// Centroid of the contacts still down.
    pub fn focus(&self) -> Option<Point> {
        Point::centroid(self.contacts.iter().map(|c| c.point))
    }
}

/// Per-kind confirmation timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmTimeouts {
    pub touch: Duration,
    pub wheel: Duration,
}

impl ConfirmTimeouts {
    /// Pointer drags share the touch timeout.
    pub fn for_kind(&self, kind: BlockKind) -> Duration {
        match kind {
            BlockKind::Wheel => self.wheel,
            BlockKind::Touch | BlockKind::Pointer => self.touch,
        }
    }
}

impl Default for ConfirmTimeouts {
    fn default() -> Self {
        Self {
            touch: Duration::from_millis(400),
            wheel: Duration::from_millis(400),
        }
    }
}

/// Owner of all live input blocks.
#[derive(Debug)]
pub struct InputBlockTracker {
    blocks: BTreeMap<BlockId, InputBlock>,
    next_id: u64,
    active: [Option<BlockId>; 3],
}

impl Default for InputBlockTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InputBlockTracker {
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            next_id: 1,
            active: [None; 3],
        }
    }

    /// Open a new block and make it the active block of its kind.
    ///
    /// Blocks that need no confirmation start `Confirmed`.
    pub fn start(
        &mut self,
        kind: BlockKind,
        target: Option<ControllerHandle>,
        requires_confirmation: bool,
        now: Instant,
    ) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        let mut block = InputBlock::new(id, kind, target, now);
        if !requires_confirmation {
            block.state = BlockState::Confirmed;
        }
        self.blocks.insert(id, block);
        self.active[kind.slot()] = Some(id);
        id
    }

    pub fn get(&self, id: BlockId) -> Option<&InputBlock> {
        self.blocks.get(&id)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut InputBlock> {
        self.blocks.get_mut(&id)
    }

    /// Active, unfinished block of `kind`.
    pub fn active(&self, kind: BlockKind) -> Option<BlockId> {
        self.active[kind.slot()]
    }

    /// Mark `id` finished and stop routing new events to it.
    ///
    /// Returns the block when it is also resolved and was removed.
    pub fn finish(&mut self, id: BlockId) -> Option<InputBlock> {
        let kind = {
            let block = self.blocks.get_mut(&id)?;
            block.finished = true;
            block.kind
        };
        if self.active[kind.slot()] == Some(id) {
            self.active[kind.slot()] = None;
        }
        self.remove_if_done(id)
    }

    /// Remove `id` if it is finished and confirmed.
    pub fn remove_if_done(&mut self, id: BlockId) -> Option<InputBlock> {
        if self.blocks.get(&id)?.is_done() {
            self.blocks.remove(&id)
        } else {
            None
        }
    }

    /// Remove `id` unconditionally.
    pub fn remove(&mut self, id: BlockId) -> Option<InputBlock> {
        let block = self.blocks.remove(&id)?;
        if self.active[block.kind.slot()] == Some(id) {
            self.active[block.kind.slot()] = None;
        }
        Some(block)
    }

    /// Pending blocks whose confirmation timeout has elapsed at `now`,
    /// oldest first.
    pub fn expired(&self, now: Instant, timeouts: &ConfirmTimeouts) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|b| {
                b.is_pending()
                    && now.saturating_duration_since(b.created_at) >= timeouts.for_kind(b.kind)
            })
            .map(|b| b.id)
            .collect()
    }

    /// Blocks that route input to `handle`, as target or provisional target.
    pub fn referencing(&self, handle: ControllerHandle) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|b| b.target == Some(handle) || b.provisional == Some(handle))
            .map(|b| b.id)
            .collect()
    }

    /// Active block ids, one per kind that has one.
    pub fn active_blocks(&self) -> impl Iterator<Item = (BlockKind, BlockId)> + '_ {
        BlockKind::ALL
            .into_iter()
            .filter_map(|kind| self.active(kind).map(|id| (kind, id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputBlock> {
        self.blocks.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

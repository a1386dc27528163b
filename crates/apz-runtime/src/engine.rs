#![forbid(unsafe_code)]

//! The render/input side of the engine.
//!
//! [`ApzEngine`] owns the [`TreeManager`] and the receiving end of the
//! control channel. It lives on one thread (the render/input context); the
//! control context only holds a [`ControlSender`].
//!
//! # Frame loop
//!
//! ```text
//! begin_frame(now)
//!   ├─ drain ≤ max_messages_per_frame control messages
//!   ├─ coalesce adjacent snapshots of the same scene
//!   ├─ apply in order
//!   ├─ tick(now)            timeouts, wheel transactions, long presses
//!   └─ publish SampledFrame  wait-free for any reader
//! ```
//!
//! Input events go straight to [`ApzEngine::receive_input_event`] between
//! frames. Offsets they produce reach [`Sampler`] readers at the next
//! publish.
//!
//! # Invariants
//!
//! 1. Control messages are applied in send order. Coalescing only merges a
//!    snapshot into the snapshot that immediately follows it for the same
//!    scene, so no other message is reordered around either.
//! 2. A coalesced snapshot is a first paint if any merged snapshot was.
//! 3. Frame numbers published through [`Sampler`] strictly increase.

use std::sync::{Arc, mpsc};

use ahash::AHashMap;
use apz_core::{InputEvent, Point, ScrollNodeId};
use apz_tree::{ContentController, Disposition, InputResult, TickSummary, TreeManager};
use arc_swap::ArcSwap;
use web_time::Instant;

use crate::channel::{ControlMsg, ControlSender, control_channel};
use crate::config::ApzConfig;

// ---------------------------------------------------------------------------
// Published frame
// ---------------------------------------------------------------------------

/// Offsets as of one [`ApzEngine::begin_frame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledFrame {
    /// Zero until the first frame is published.
    pub frame: u64,
    pub offsets: AHashMap<ScrollNodeId, Point>,
}

/// Wait-free read handle for composited offsets. Clone freely across
/// threads.
#[derive(Debug, Clone)]
pub struct Sampler {
    store: Arc<ArcSwap<SampledFrame>>,
}

impl Sampler {
    /// Offset of `id` as of the last published frame.
    pub fn composited_offset(&self, id: ScrollNodeId) -> Option<Point> {
        self.store.load().offsets.get(&id).copied()
    }

    /// The whole last published frame.
    pub fn frame(&self) -> Arc<SampledFrame> {
        self.store.load_full()
    }

    pub fn frame_number(&self) -> u64 {
        self.store.load().frame
    }
}

// ---------------------------------------------------------------------------
// Frame report
// ---------------------------------------------------------------------------

/// What one [`ApzEngine::begin_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub frame: u64,
    /// Messages taken off the channel.
    pub received: usize,
    /// Snapshots folded into a later snapshot of the same scene.
    pub coalesced: usize,
    /// Messages that named a block, identity, or scene that no longer
    /// exists.
    pub stale: usize,
    pub rebuilds: usize,
    /// More messages were waiting when the per-frame limit was reached.
    pub backlog: bool,
    /// Every [`ControlSender`] has been dropped.
    pub control_disconnected: bool,
    pub tick: TickSummary,
}

// ---------------------------------------------------------------------------
// ApzEngine
// ---------------------------------------------------------------------------

pub struct ApzEngine {
    manager: TreeManager,
    rx: mpsc::Receiver<ControlMsg>,
    published: Arc<ArcSwap<SampledFrame>>,
    max_messages_per_frame: usize,
    /// First message past the per-frame limit.
    carry: Option<ControlMsg>,
    frame: u64,
}

impl std::fmt::Debug for ApzEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApzEngine")
            .field("frame", &self.frame)
            .field("controllers", &self.manager.registry().len())
            .field("max_messages_per_frame", &self.max_messages_per_frame)
            .finish_non_exhaustive()
    }
}

impl ApzEngine {
    /// Build an engine and the sender the control context keeps.
    ///
    /// `config` is taken as given; call [`ApzConfig::validated`] first to
    /// reject out-of-range values.
    pub fn new(config: &ApzConfig, content: Arc<dyn ContentController>) -> (Self, ControlSender) {
        let (tx, rx) = control_channel(config.channel.capacity);
        let engine = Self {
            manager: TreeManager::new(config.input_config(), content),
            rx,
            published: Arc::new(ArcSwap::from_pointee(SampledFrame::default())),
            max_messages_per_frame: config.channel.max_messages_per_frame.max(1),
            carry: None,
            frame: 0,
        };
        tracing::info!(
            message = "apz.engine.start",
            capacity = config.channel.capacity,
            max_messages_per_frame = engine.max_messages_per_frame
        );
        (engine, tx)
    }

    pub fn manager(&self) -> &TreeManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut TreeManager {
        &mut self.manager
    }

    pub fn sampler(&self) -> Sampler {
        Sampler {
            store: Arc::clone(&self.published),
        }
    }

    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    /// Route one input event on the render/input context.
    pub fn receive_input_event(&mut self, event: &InputEvent) -> InputResult {
        self.manager.receive_input_event(event)
    }

    /// Apply pending control messages, advance timers, and publish offsets.
    pub fn begin_frame(&mut self, now: Instant) -> FrameReport {
        self.frame += 1;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };

        let mut batch: Vec<ControlMsg> = self.carry.take().into_iter().collect();
        loop {
            let msg = match self.rx.try_recv() {
                Ok(msg) => msg,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    report.control_disconnected = true;
                    break;
                }
            };
            if batch.len() == self.max_messages_per_frame {
                // Held for the next frame, ahead of anything still queued.
                self.carry = Some(msg);
                report.backlog = true;
                break;
            }
            batch.push(msg);
        }
        report.received = batch.len();

        let (batch, coalesced) = coalesce(batch);
        report.coalesced = coalesced;
        for msg in batch {
            self.apply(msg, &mut report);
        }

        report.tick = self.manager.tick(now);
        self.publish();

        tracing::debug!(
            message = "apz.frame",
            frame = report.frame,
            received = report.received,
            coalesced = report.coalesced,
            stale = report.stale,
            backlog = report.backlog
        );
        report
    }

    fn apply(&mut self, msg: ControlMsg, report: &mut FrameReport) {
        tracing::trace!(message = "apz.control.apply", kind = msg.kind_name());
        let disposition = match msg {
            ControlMsg::SceneSnapshot {
                scene,
                root,
                is_first_paint,
            } => {
                self.manager.rebuild_tree(scene, root, is_first_paint);
                report.rebuilds += 1;
                Disposition::Applied
            }
            ControlMsg::RemoveScene { scene } => {
                let d = self.manager.remove_scene(scene);
                if d == Disposition::Applied {
                    report.rebuilds += 1;
                }
                d
            }
            ControlMsg::SetRootScene { scene } => {
                self.manager.set_root_scene(scene);
                report.rebuilds += 1;
                Disposition::Applied
            }
            ControlMsg::ConfirmTarget { block, target } => {
                self.manager.confirm_target(block, target)
            }
            ControlMsg::ContentResponse {
                block,
                prevent_default,
            } => self
                .manager
                .content_received_input_block(block, prevent_default),
            ControlMsg::CancelBlock { block } => self.manager.cancel_block(block),
            ControlMsg::PushOffset {
                id,
                offset,
                generation,
            } => self.manager.push_authoritative_offset(id, offset, generation),
        };
        if disposition == Disposition::Stale {
            report.stale += 1;
        }
    }

    fn publish(&self) {
        let frame = SampledFrame {
            frame: self.frame,
            offsets: self.manager.composited_offsets().collect(),
        };
        self.published.store(Arc::new(frame));
    }
}

/// Fold each snapshot into an immediately following snapshot of the same
/// scene. Returns the reduced batch and how many snapshots were folded.
fn coalesce(batch: Vec<ControlMsg>) -> (Vec<ControlMsg>, usize) {
    let mut out: Vec<ControlMsg> = Vec::with_capacity(batch.len());
    let mut folded = 0;
    for msg in batch {
        if let ControlMsg::SceneSnapshot {
            scene,
            root,
            is_first_paint,
        } = msg
        {
            if let Some(ControlMsg::SceneSnapshot {
                scene: prev_scene,
                is_first_paint: prev_first,
                ..
            }) = out.last()
                && *prev_scene == scene
            {
                let is_first_paint = is_first_paint || *prev_first;
                out.pop();
                folded += 1;
                out.push(ControlMsg::SceneSnapshot {
                    scene,
                    root,
                    is_first_paint,
                });
            } else {
                out.push(ControlMsg::SceneSnapshot {
                    scene,
                    root,
                    is_first_paint,
                });
            }
        } else {
            out.push(msg);
        }
    }
    (out, folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apz_core::{Rect, SceneId};
    use apz_tree::{BlockId, SceneNode};

    fn snap(scene: u64, width: f32, first: bool) -> ControlMsg {
        ControlMsg::SceneSnapshot {
            scene: SceneId(scene),
            root: SceneNode::new(1, Rect::from_size(width, 10.0)),
            is_first_paint: first,
        }
    }

    fn width_of(msg: &ControlMsg) -> Option<f32> {
        match msg {
            ControlMsg::SceneSnapshot { root, .. } => Some(root.bounds.width),
            _ => None,
        }
    }

    #[test]
    fn adjacent_same_scene_snapshots_fold() {
        let (out, folded) = coalesce(vec![snap(1, 10.0, true), snap(1, 20.0, false)]);
        assert_eq!(folded, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(width_of(&out[0]), Some(20.0));
        assert!(matches!(
            out[0],
            ControlMsg::SceneSnapshot {
                is_first_paint: true,
                ..
            }
        ));
    }

    #[test]
    fn other_messages_block_folding() {
        let batch = vec![
            snap(1, 10.0, false),
            ControlMsg::CancelBlock { block: BlockId(0) },
            snap(1, 20.0, false),
        ];
        let (out, folded) = coalesce(batch);
        assert_eq!(folded, 0);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn different_scenes_do_not_fold() {
        let (out, folded) = coalesce(vec![snap(1, 10.0, false), snap(2, 20.0, false)]);
        assert_eq!(folded, 0);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn frame_numbers_increase_and_publish() {
        let (mut engine, _tx) = ApzEngine::new(
            &ApzConfig::default(),
            Arc::new(apz_tree::NoopContentController),
        );
        let sampler = engine.sampler();
        assert_eq!(sampler.frame_number(), 0);
        let now = Instant::now();
        assert_eq!(engine.begin_frame(now).frame, 1);
        assert_eq!(engine.begin_frame(now).frame, 2);
        assert_eq!(sampler.frame_number(), 2);
    }

    #[test]
    fn dropped_sender_is_reported() {
        let (mut engine, tx) = ApzEngine::new(
            &ApzConfig::default(),
            Arc::new(apz_tree::NoopContentController),
        );
        drop(tx);
        assert!(engine.begin_frame(Instant::now()).control_disconnected);
    }

    #[test]
    fn per_frame_limit_leaves_backlog() {
        let mut config = ApzConfig::default();
        config.channel.max_messages_per_frame = 2;
        let (mut engine, tx) =
            ApzEngine::new(&config, Arc::new(apz_tree::NoopContentController));
        for b in 0..3 {
            tx.send(ControlMsg::CancelBlock { block: BlockId(b) })
                .expect("send");
        }
        let now = Instant::now();
        let first = engine.begin_frame(now);
        assert_eq!((first.received, first.backlog, first.stale), (2, true, 2));
        let second = engine.begin_frame(now);
        assert_eq!((second.received, second.backlog), (1, false));
    }

    #[test]
    fn exactly_full_frame_has_no_backlog() {
        let mut config = ApzConfig::default();
        config.channel.max_messages_per_frame = 2;
        let (mut engine, tx) =
            ApzEngine::new(&config, Arc::new(apz_tree::NoopContentController));
        for b in 0..2 {
            tx.send(ControlMsg::CancelBlock { block: BlockId(b) })
                .expect("send");
        }
        let report = engine.begin_frame(Instant::now());
        assert_eq!((report.received, report.backlog), (2, false));
    }
}

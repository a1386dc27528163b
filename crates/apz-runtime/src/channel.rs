#![forbid(unsafe_code)]

//! Control-to-render message channel.
//!
//! The control context never touches the [`TreeManager`](apz_tree::TreeManager)
//! directly. It sends [`ControlMsg`]s through a bounded channel and the
//! render/input context applies them at the start of the next frame.
//!
//! # Ordering
//!
//! Messages are applied in send order. Adjacent snapshots of the same scene
//! are coalesced into the newest one before application (see
//! [`ApzEngine::begin_frame`](crate::ApzEngine::begin_frame)).
//!
//! # Backpressure
//!
//! [`ControlSender::send`] blocks while the channel is full;
//! [`ControlSender::try_send`] reports [`ChannelError::Full`] instead.

use std::sync::mpsc;

use apz_core::{Point, SceneId, ScrollGeneration, ScrollNodeId};
use apz_tree::{BlockId, SceneNode};

use crate::error::ChannelError;

/// Default bounded capacity.
pub const CHANNEL_CAPACITY: usize = 256;

/// A request from the control context.
#[derive(Debug, Clone)]
pub enum ControlMsg {
    /// New snapshot for one scene.
    SceneSnapshot {
        scene: SceneId,
        root: SceneNode,
        is_first_paint: bool,
    },
    RemoveScene {
        scene: SceneId,
    },
    SetRootScene {
        scene: SceneId,
    },
    /// Answer to a block's target confirmation request. `None` confirms
    /// that no controller should take the block.
    ConfirmTarget {
        block: BlockId,
        target: Option<ScrollNodeId>,
    },
    ContentResponse {
        block: BlockId,
        prevent_default: bool,
    },
    CancelBlock {
        block: BlockId,
    },
    PushOffset {
        id: ScrollNodeId,
        offset: Point,
        generation: ScrollGeneration,
    },
}

impl ControlMsg {
    /// Short name for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SceneSnapshot { .. } => "scene_snapshot",
            Self::RemoveScene { .. } => "remove_scene",
            Self::SetRootScene { .. } => "set_root_scene",
            Self::ConfirmTarget { .. } => "confirm_target",
            Self::ContentResponse { .. } => "content_response",
            Self::CancelBlock { .. } => "cancel_block",
            Self::PushOffset { .. } => "push_offset",
        }
    }
}

/// Sending half of the control channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::SyncSender<ControlMsg>,
}

impl ControlSender {
    /// Enqueue `msg`, blocking while the channel is full.
    pub fn send(&self, msg: ControlMsg) -> Result<(), ChannelError> {
        self.tx.send(msg).map_err(|_| ChannelError::Disconnected)
    }

    /// Enqueue `msg` without blocking.
    pub fn try_send(&self, msg: ControlMsg) -> Result<(), ChannelError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::TrySendError::Full(_) => ChannelError::Full,
            mpsc::TrySendError::Disconnected(_) => ChannelError::Disconnected,
        })
    }

    pub fn send_scene(
        &self,
        scene: SceneId,
        root: SceneNode,
        is_first_paint: bool,
    ) -> Result<(), ChannelError> {
        self.send(ControlMsg::SceneSnapshot {
            scene,
            root,
            is_first_paint,
        })
    }

    pub fn confirm_target(
        &self,
        block: BlockId,
        target: Option<ScrollNodeId>,
    ) -> Result<(), ChannelError> {
        self.send(ControlMsg::ConfirmTarget { block, target })
    }

    pub fn content_response(&self, block: BlockId, prevent_default: bool) -> Result<(), ChannelError> {
        self.send(ControlMsg::ContentResponse {
            block,
            prevent_default,
        })
    }

    pub fn push_offset(
        &self,
        id: ScrollNodeId,
        offset: Point,
        generation: ScrollGeneration,
    ) -> Result<(), ChannelError> {
        self.send(ControlMsg::PushOffset {
            id,
            offset,
            generation,
        })
    }
}

/// Create a bounded control channel. A zero capacity is raised to one so
/// the channel never degenerates into a rendezvous.
pub fn control_channel(capacity: usize) -> (ControlSender, mpsc::Receiver<ControlMsg>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (ControlSender { tx }, rx)
}

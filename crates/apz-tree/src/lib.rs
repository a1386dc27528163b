#![forbid(unsafe_code)]

//! Async pan-zoom engine: controllers, hit testing, and input blocks.
//!
//! # Role in the workspace
//! `apz-tree` is the synchronous core. [`TreeManager`] mirrors the scene
//! forest into a [`HitTestTree`], keeps one [`ScrollController`] per scroll
//! node identity in a [`ControllerRegistry`], and routes input through
//! [`InputBlockTracker`] blocks that may be retargeted when the control
//! context confirms a different target.
//!
//! # How it fits in the system
//! Nothing here spawns threads or locks. `apz-runtime` owns a `TreeManager`
//! on the render/input context and feeds it control messages once per
//! frame.
//!
//! # Example
//!
//! ```
//! use apz_core::{Point, Rect, SceneId, ScrollGeometry, ScrollId, ScrollNodeId};
//! use apz_tree::{SceneNode, ScrollMetadata, TreeManager};
//!
//! let geometry = ScrollGeometry::new(Rect::from_size(500.0, 500.0), Rect::from_size(200.0, 200.0));
//! let root = SceneNode::new(1, Rect::from_size(200.0, 200.0))
//!     .with_scroll(ScrollMetadata::new(ScrollId::START, geometry).root_content());
//!
//! let mut manager = TreeManager::default();
//! manager.rebuild_tree(SceneId(1), root, true);
//!
//! let id = ScrollNodeId::new(SceneId(1), ScrollId::START);
//! assert_eq!(manager.get_composited_offset(id), Some(Point::ZERO));
//! ```

pub mod content;
pub mod controller;
pub mod hit_tree;
pub mod input_block;
pub mod manager;
pub mod registry;
pub mod scene;

pub use content::{
    ContentController, ContentNotification, NoopContentController, RecordingContentController,
};
pub use controller::{GestureInput, InputOutcome, OffsetSnapshot, ScrollController};
pub use hit_tree::{HitTestNode, HitTestTree, NodeIndex};
pub use input_block::{
    BlockId, BlockKind, BlockState, ConfirmTimeouts, InputBlock, InputBlockTracker,
};
pub use manager::{
    Disposition, InputConfig, InputResult, InputStatus, RebuildSummary, TickSummary, TreeManager,
};
pub use registry::{ControllerHandle, ControllerRegistry};
pub use scene::{HitFlags, SceneNode, ScrollMetadata};

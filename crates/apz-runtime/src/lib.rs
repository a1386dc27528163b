#![forbid(unsafe_code)]

//! Threading, configuration, and logging around the `apz-tree` core.
//!
//! # Contexts
//!
//! - The **control** context produces scene snapshots and answers target
//!   confirmation requests. It holds a [`ControlSender`] and a
//!   [`NotificationReceiver`].
//! - The **render/input** context owns the [`ApzEngine`], routes input, and
//!   calls [`ApzEngine::begin_frame`] once per frame.
//! - Any thread may hold a [`Sampler`] and read composited offsets without
//!   blocking.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use apz_core::{Rect, SceneId, ScrollGeometry, ScrollId, ScrollNodeId};
//! use apz_runtime::{ApzConfig, ApzEngine, notification_channel};
//! use apz_tree::{SceneNode, ScrollMetadata};
//! use web_time::Instant;
//!
//! let (content, _notifications) = notification_channel();
//! let (mut engine, control) = ApzEngine::new(&ApzConfig::default(), Arc::new(content));
//! let sampler = engine.sampler();
//!
//! let geometry = ScrollGeometry::new(Rect::from_size(400.0, 900.0), Rect::from_size(400.0, 300.0));
//! let root = SceneNode::new(1, Rect::from_size(400.0, 300.0))
//!     .with_scroll(ScrollMetadata::new(ScrollId::START, geometry).root_content());
//! control.send_scene(SceneId(1), root, true).unwrap();
//!
//! engine.begin_frame(Instant::now());
//! let id = ScrollNodeId::new(SceneId(1), ScrollId::START);
//! assert!(sampler.composited_offset(id).is_some());
//! ```

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod notify;

pub use channel::{CHANNEL_CAPACITY, ControlMsg, ControlSender, control_channel};
pub use config::{
    ApzConfig, ChannelSection, ConfigError, GestureSection, InputSection, LoggingConfig,
};
pub use engine::{ApzEngine, FrameReport, SampledFrame, Sampler};
pub use error::{ChannelError, LoggingError};
pub use notify::{ChannelContentController, NotificationReceiver, notification_channel};

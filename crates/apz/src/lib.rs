#![forbid(unsafe_code)]

//! Async pan-zoom engine public facade.
//!
//! Re-exports the types most hosts need from the internal crates, a
//! top-level [`Error`], and [`start`] for wiring an engine from a
//! configuration in one call.

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use apz_core::{
    InputEvent, Modifiers, Point, PointerEvent, PointerKind, Rect, SceneId, ScrollGeneration,
    ScrollGeometry, ScrollId, ScrollNodeId, Size, TapKind, TouchEvent, TouchPhase, WheelEvent,
};

// --- Tree re-exports -------------------------------------------------------

pub use apz_tree::{
    BlockId, ContentController, ContentNotification, Disposition, HitFlags, InputResult,
    InputStatus, SceneNode, ScrollMetadata, TreeManager,
};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use apz_runtime::{
    ApzConfig, ApzEngine, ChannelError, ConfigError, ControlMsg, ControlSender, FrameReport,
    LoggingError, NotificationReceiver, SampledFrame, Sampler,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    #[cfg(feature = "runtime")]
    Config(ConfigError),
    #[cfg(feature = "runtime")]
    Channel(ChannelError),
    #[cfg(feature = "runtime")]
    Logging(LoggingError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Config(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Channel(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Config(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Channel(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Logging(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "runtime")]
impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

#[cfg(feature = "runtime")]
impl From<ChannelError> for Error {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

#[cfg(feature = "runtime")]
impl From<LoggingError> for Error {
    fn from(err: LoggingError) -> Self {
        Self::Logging(err)
    }
}

/// Standard result type for apz APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Wiring ----------------------------------------------------------------

/// Both ends the control context keeps.
#[cfg(feature = "runtime")]
#[derive(Debug)]
pub struct ControlHandles {
    pub control: ControlSender,
    pub notifications: NotificationReceiver,
}

/// Validate `config` and build an engine whose content notifications flow
/// back over a channel.
#[cfg(feature = "runtime")]
pub fn start(config: ApzConfig) -> Result<(ApzEngine, ControlHandles)> {
    let config = config.validated()?;
    let (content, notifications) = apz_runtime::notification_channel();
    let (engine, control) = ApzEngine::new(&config, std::sync::Arc::new(content));
    Ok((
        engine,
        ControlHandles {
            control,
            notifications,
        },
    ))
}

/// [`start`] with the configuration read from `path`.
#[cfg(feature = "runtime")]
pub fn start_from_file(path: impl AsRef<std::path::Path>) -> Result<(ApzEngine, ControlHandles)> {
    start(ApzConfig::load_file(path)?)
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Error, InputEvent, Point, Rect, Result, SceneId, SceneNode, ScrollGeometry, ScrollId,
        ScrollMetadata, ScrollNodeId,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{ApzConfig, ApzEngine, ControlSender, Sampler};

    pub use crate::{core, tree};

    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use apz_core as core;
#[cfg(feature = "runtime")]
pub use apz_runtime as runtime;
pub use apz_tree as tree;

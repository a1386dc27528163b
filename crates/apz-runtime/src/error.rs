#![forbid(unsafe_code)]

//! Runtime error types.

use std::fmt;

/// The control channel refused a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The bounded channel is at capacity (only from `try_send`).
    Full,
    /// The engine was dropped.
    Disconnected,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("control channel is full"),
            Self::Disconnected => f.write_str("control channel is disconnected"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Installing the global subscriber failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// The filter directives did not parse.
    InvalidFilter(String),
    /// A global subscriber is already set.
    AlreadyInitialized,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter(msg) => write!(f, "invalid log filter: {msg}"),
            Self::AlreadyInitialized => f.write_str("a global subscriber is already installed"),
        }
    }
}

impl std::error::Error for LoggingError {}

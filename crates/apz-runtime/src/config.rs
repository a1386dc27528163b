#![forbid(unsafe_code)]

//! Engine configuration as data.
//!
//! [`ApzConfig`] gathers every tunable of the engine and the runtime into
//! one struct that loads from TOML or JSON.
//!
//! # Loading
//!
//! ```toml
//! # apz.toml
//! [input]
//! touch_confirm_timeout_ms = 300
//!
//! [logging]
//! filter = "apz_tree=debug,info"
//! json = true
//! ```
//!
//! ```rust,ignore
//! let config = ApzConfig::load_file("apz.toml")?;
//! let config = ApzConfig::from_json_str(json)?;
//! ```
//!
//! # Defaults
//!
//! Missing sections and fields take their defaults, so an empty document is
//! a valid configuration.

use std::path::Path;

use apz_core::GestureConfig;
use apz_tree::{ConfirmTimeouts, InputConfig};
use serde::{Deserialize, Serialize};
use web_time::Duration;

// ---------------------------------------------------------------------------
// Top-level ApzConfig
// ---------------------------------------------------------------------------

/// Every tunable of the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApzConfig {
    /// Input block timing and wheel scaling.
    pub input: InputSection,

    /// Tap and long-press thresholds.
    pub gesture: GestureSection,

    /// Control channel sizing.
    pub channel: ChannelSection,

    /// Log filter and format.
    pub logging: LoggingConfig,
}

impl ApzConfig {
    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Load a file by extension (`.json` is JSON, anything else TOML) and
    /// validate it.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_file(path)?
        } else {
            Self::from_toml_file(path)?
        };
        config.validated()
    }

    /// `self` if [`validate`](Self::validate) finds nothing, otherwise
    /// [`ConfigError::Invalid`].
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// List every out-of-range field. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.input.touch_confirm_timeout_ms == 0 {
            errors.push("input.touch_confirm_timeout_ms must be > 0".into());
        }
        if self.input.wheel_confirm_timeout_ms == 0 {
            errors.push("input.wheel_confirm_timeout_ms must be > 0".into());
        }
        if self.input.wheel_transaction_timeout_ms == 0 {
            errors.push("input.wheel_transaction_timeout_ms must be > 0".into());
        }
        if !(self.input.wheel_line_px.is_finite() && self.input.wheel_line_px > 0.0) {
            errors.push(format!(
                "input.wheel_line_px must be a positive number, got {}",
                self.input.wheel_line_px
            ));
        }

        if self.gesture.long_press_ms == 0 {
            errors.push("gesture.long_press_ms must be > 0".into());
        }
        if !(self.gesture.touch_slop_px.is_finite() && self.gesture.touch_slop_px >= 0.0) {
            errors.push(format!(
                "gesture.touch_slop_px must be >= 0, got {}",
                self.gesture.touch_slop_px
            ));
        }

        if self.channel.capacity == 0 {
            errors.push("channel.capacity must be > 0".into());
        }
        if self.channel.max_messages_per_frame == 0 {
            errors.push("channel.max_messages_per_frame must be > 0".into());
        }

        if self.logging.filter.trim().is_empty() {
            errors.push("logging.filter must not be empty".into());
        }

        errors
    }

    /// Routing tunables for the tree manager.
    #[must_use]
    pub fn input_config(&self) -> InputConfig {
        InputConfig {
            timeouts: ConfirmTimeouts {
                touch: Duration::from_millis(self.input.touch_confirm_timeout_ms),
                wheel: Duration::from_millis(self.input.wheel_confirm_timeout_ms),
            },
            wheel_transaction_timeout: Duration::from_millis(
                self.input.wheel_transaction_timeout_ms,
            ),
            wheel_line_px: self.input.wheel_line_px,
            gesture: self.gesture_config(),
        }
    }

    #[must_use]
    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            long_press_threshold: Duration::from_millis(self.gesture.long_press_ms),
            touch_slop: self.gesture.touch_slop_px,
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// `[input]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSection {
    /// Confirmation timeout for touch and pointer blocks. Default: 400.
    pub touch_confirm_timeout_ms: u64,
    /// Confirmation timeout for wheel blocks. Default: 400.
    pub wheel_confirm_timeout_ms: u64,
    /// Gap after which the next wheel event starts a new block. Default: 1500.
    pub wheel_transaction_timeout_ms: u64,
    /// Pixels per line for line-mode wheel deltas. Default: 16.
    pub wheel_line_px: f32,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            touch_confirm_timeout_ms: 400,
            wheel_confirm_timeout_ms: 400,
            wheel_transaction_timeout_ms: 1500,
            wheel_line_px: 16.0,
        }
    }
}

/// `[gesture]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureSection {
    /// Hold duration for a long tap. Default: 500.
    pub long_press_ms: u64,
    /// Movement allowed before a touch becomes a pan. Default: 8.
    pub touch_slop_px: f32,
}

impl Default for GestureSection {
    fn default() -> Self {
        Self {
            long_press_ms: 500,
            touch_slop_px: 8.0,
        }
    }
}

/// `[channel]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// Bounded capacity of the control channel. Default: 256.
    pub capacity: usize,
    /// Control messages applied per frame at most; the rest wait for the
    /// next frame. Default: 64.
    pub max_messages_per_frame: usize,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_messages_per_frame: 64,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives. Default: `"info"`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur when loading a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// Validation errors.
    Invalid(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Invalid(errors) => write!(f, "invalid configuration: {}", errors.join("; ")),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Invalid(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_validates_clean() {
        assert!(ApzConfig::default().validate().is_empty());
    }

    #[test]
    fn default_matches_engine_defaults() {
        let config = ApzConfig::default();
        assert_eq!(config.input_config(), InputConfig::default());
        assert_eq!(config.gesture_config(), GestureConfig::default());
    }

    #[test]
    fn empty_toml_is_default() {
        let config = ApzConfig::from_toml_str("").expect("parse");
        assert_eq!(config, ApzConfig::default());
    }

    #[test]
    fn partial_override_preserves_defaults() {
        let config = ApzConfig::from_toml_str(
            "[input]\ntouch_confirm_timeout_ms = 250\n\n[logging]\njson = true\n",
        )
        .expect("parse");
        assert_eq!(config.input.touch_confirm_timeout_ms, 250);
        assert_eq!(config.input.wheel_confirm_timeout_ms, 400);
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "info");
        assert_eq!(
            config.input_config().timeouts.touch,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn json_round_trip() {
        let mut config = ApzConfig::default();
        config.channel.capacity = 8;
        let json = serde_json::to_string(&config).expect("serialize");
        assert_eq!(ApzConfig::from_json_str(&json).expect("parse"), config);
    }

    #[test]
    fn multiple_validation_errors_collected() {
        let mut config = ApzConfig::default();
        config.input.wheel_line_px = -1.0;
        config.channel.capacity = 0;
        config.gesture.long_press_ms = 0;
        let errors = config.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(matches!(config.validated(), Err(ConfigError::Invalid(e)) if e.len() == 3));
    }

    #[test]
    fn bad_toml_is_reported() {
        let err = ApzConfig::from_toml_str("[input\n").expect_err("must fail");
        assert!(err.to_string().starts_with("TOML parse error"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let err = ApzConfig::from_json_str(r#"{"channel": {"capacity": "big"}}"#)
            .expect_err("must fail");
        assert!(matches!(err, ConfigError::Json(_)));
    }
}

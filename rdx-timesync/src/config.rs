//! Defines all configuration structures for the timesync engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (usually TOML) using `serde` and the `config` crate. Every section has a
//! default, so an empty file or no file at all yields a working engine.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `TIMESYNC__RESOLVER__TOLERANCE_MS=250`.
pub const ENV_PREFIX: &str = "TIMESYNC";

/// The top-level configuration for the `SyncEngine`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// How often batched visual updates are flushed.
    #[serde(default)]
    pub frame_resolution: FrameResolution,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub viewport: ViewportConfig,

    /// Channel display colors, consumed by the view adapters.
    #[serde(default)]
    pub palette: PaletteConfig,
}

/// Defines the cadence of the `FrameClock`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameResolution {
    /// ~60 frames per second, the usual display refresh rate.
    #[default]
    High,
    /// ~30 frames per second.
    Medium,
    /// 1 frame per second. Useful when stepping a session by hand.
    Low,
    /// A user-defined rate in frames per second.
    Custom { frames_per_second: u64 },
}

impl FrameResolution {
    pub fn frames_per_second(&self) -> u64 {
        match self {
            FrameResolution::High => 60,
            FrameResolution::Medium => 30,
            FrameResolution::Low => 1,
            FrameResolution::Custom { frames_per_second } => *frames_per_second,
        }
    }

    /// Duration of one frame. A zero rate is rejected by `SyncConfig::validate`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.frames_per_second().max(1))
    }
}

/// Intervals for the pointer throttle and the pointer-leave debounce.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_pointer_throttle_ms")]
    pub pointer_throttle_ms: u64,
    #[serde(default = "default_leave_debounce_ms")]
    pub leave_debounce_ms: u64,
}

impl RateLimitConfig {
    pub fn pointer_throttle(&self) -> Duration {
        Duration::from_millis(self.pointer_throttle_ms)
    }

    pub fn leave_debounce(&self) -> Duration {
        Duration::from_millis(self.leave_debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// A binary-search probe this close to the target ends the search early.
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportConfig {
    /// Narrowest viewport as a fraction of the full time range.
    #[serde(default = "default_min_width")]
    pub min_width: f64,
    #[serde(default = "default_zoom_in_factor")]
    pub zoom_in_factor: f64,
    #[serde(default = "default_zoom_out_factor")]
    pub zoom_out_factor: f64,
}

/// Display colors for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelColor {
    pub border_color: String,
    pub background_color: String,
}

/// Maps channel names to display colors, with a fallback for unknown names.
#[derive(Debug, Clone, Deserialize)]
pub struct PaletteConfig {
    #[serde(default = "default_fallback_color")]
    pub fallback: ChannelColor,
    #[serde(default)]
    pub channels: HashMap<String, ChannelColor>,
}

impl PaletteConfig {
    /// Looks up a channel's colors, falling back when the name is absent.
    pub fn color_for(&self, channel: &str) -> &ChannelColor {
        self.channels.get(channel).unwrap_or(&self.fallback)
    }
}

impl SyncConfig {
    /// Loads a configuration file and applies `TIMESYNC__*` environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let parsed: SyncConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parses a TOML document without touching the environment.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let parsed: SyncConfig = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Rejects values the engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let min_width = self.viewport.min_width;
        if !(min_width > 0.0 && min_width <= 1.0) {
            return Err(SyncError::InvalidConfig(format!(
                "viewport.min_width must be in (0, 1], got {min_width}"
            )));
        }
        if self.viewport.zoom_in_factor <= 0.0 || self.viewport.zoom_out_factor <= 0.0 {
            return Err(SyncError::InvalidConfig(
                "zoom factors must be positive".to_string(),
            ));
        }
        if self.frame_resolution.frames_per_second() == 0 {
            return Err(SyncError::InvalidConfig(
                "frame_resolution must be at least one frame per second".to_string(),
            ));
        }
        Ok(())
    }
}

// --- Default value functions for serde ---

fn default_pointer_throttle_ms() -> u64 {
    16
}

fn default_leave_debounce_ms() -> u64 {
    50
}

fn default_tolerance_ms() -> u64 {
    500
}

fn default_min_width() -> f64 {
    0.05
}

fn default_zoom_in_factor() -> f64 {
    0.5
}

fn default_zoom_out_factor() -> f64 {
    2.0
}

fn default_fallback_color() -> ChannelColor {
    ChannelColor {
        border_color: "rgba(128, 128, 128, 1)".to_string(),
        background_color: "rgba(128, 128, 128, 0.2)".to_string(),
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            pointer_throttle_ms: default_pointer_throttle_ms(),
            leave_debounce_ms: default_leave_debounce_ms(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: default_tolerance_ms(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            zoom_in_factor: default_zoom_in_factor(),
            zoom_out_factor: default_zoom_out_factor(),
        }
    }
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback_color(),
            channels: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config.frame_resolution, FrameResolution::High);
        assert_eq!(config.rate_limits.pointer_throttle_ms, 16);
        assert_eq!(config.resolver.tolerance_ms, 500);
        assert!((config.viewport.min_width - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            frame_resolution = "medium"

            [rate_limits]
            pointer_throttle_ms = 33

            [palette.channels.speed]
            border_color = "red"
            background_color = "pink"
            "#,
        )
        .unwrap();
        assert_eq!(config.frame_resolution.frames_per_second(), 30);
        assert_eq!(config.rate_limits.pointer_throttle(), Duration::from_millis(33));
        assert_eq!(config.rate_limits.leave_debounce_ms, 50);
        assert_eq!(config.palette.color_for("speed").border_color, "red");
    }

    #[test]
    fn test_palette_falls_back_for_unknown_channel() {
        let palette = PaletteConfig::default();
        assert_eq!(palette.color_for("nope"), &palette.fallback);
    }

    #[test]
    fn test_validate_rejects_bad_min_width() {
        let err = SyncConfig::from_toml_str("[viewport]\nmin_width = 0.0").unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_frame_interval_for_high_resolution() {
        assert_eq!(
            FrameResolution::High.frame_interval(),
            Duration::from_micros(16_666)
        );
    }
}

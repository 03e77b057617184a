// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{self, ahat};
use crate::errors::TrackingResult;

/// Application identifier used for the config directory
pub const APP_ID: &str = "ir-tool-tracking";

/// Depth and amplitude visualization thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Subtracted from raw depth before visualization (mm)
    pub depth_offset: u16,
    /// Depth below this after the offset is rendered black (mm)
    pub near_clip: u16,
    /// Raw depth above this is treated as invalid (mm)
    pub far_clip: u16,
    /// Amplitude above this renders white
    pub amplitude_saturation: u16,
    /// Depth window mapped onto the byte range (mm)
    pub visualization_range_mm: u16,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            depth_offset: 0,
            near_clip: constants::DEPTH_NEAR_CLIP_MM,
            far_clip: constants::DEPTH_FAR_CLIP_MM,
            amplitude_saturation: constants::AMPLITUDE_SATURATION,
            visualization_range_mm: constants::VISUALIZATION_RANGE_MM,
        }
    }
}

/// Acquisition loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sleep after the sensor repeats a frame (ms)
    pub duplicate_backoff_ms: u64,
    /// Stop the loop after this many duplicates in a row (unbounded when unset)
    pub max_consecutive_duplicates: Option<u32>,
}

impl AcquisitionConfig {
    pub fn duplicate_backoff(&self) -> Duration {
        Duration::from_millis(self.duplicate_backoff_ms)
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            duplicate_backoff_ms: constants::DUPLICATE_FRAME_BACKOFF.as_millis() as u64,
            max_consecutive_duplicates: None,
        }
    }
}

/// Smoothing applied to tool definitions that do not specify their own
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolDefaults {
    pub lowpass_rotation: f32,
    pub lowpass_position: f32,
}

impl Default for ToolDefaults {
    fn default() -> Self {
        Self {
            lowpass_rotation: constants::DEFAULT_LOWPASS_ROTATION,
            lowpass_position: constants::DEFAULT_LOWPASS_POSITION,
        }
    }
}

/// Built-in synthetic sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Delay between generated frames (ms)
    pub frame_interval_ms: u64,
    /// Repeat every Nth frame to exercise deduplication (0 disables)
    pub duplicate_every: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: ahat::WIDTH,
            height: ahat::HEIGHT,
            frame_interval_ms: ahat::FRAME_INTERVAL_MS,
            duplicate_every: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Visualization thresholds
    pub processing: ProcessingConfig,
    /// Acquisition loop timing
    pub acquisition: AcquisitionConfig,
    /// Tool smoothing defaults
    pub tool_defaults: ToolDefaults,
    /// Synthetic sensor settings
    pub synthetic: SyntheticConfig,
}

impl Config {
    /// Default config file location (`<config dir>/ir-tool-tracking/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_ID).join("config.json"))
    }

    /// Read a config file; missing fields take their defaults
    pub fn load(path: &Path) -> TrackingResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Read a config file, falling back to defaults when missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> TrackingResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }
}

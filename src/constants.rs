// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants
//!
//! Thresholds for the depth and amplitude visualization, loop timing and
//! tool-definition defaults. The values mirror what the short-throw depth
//! sensor delivers; see [`crate::config::ProcessingConfig`] for the knobs
//! that can be overridden at runtime.

use std::time::Duration;

/// Raw depth values above this are outside the sensor's valid range (mm)
pub const DEPTH_FAR_CLIP_MM: u16 = 4090;

/// Depth values below this (after offset) are rendered black (mm)
pub const DEPTH_NEAR_CLIP_MM: u16 = 0;

/// Width of the depth window mapped onto 0..=255 (mm)
pub const VISUALIZATION_RANGE_MM: u16 = 1000;

/// Amplitude (active brightness) values above this saturate to white
pub const AMPLITUDE_SATURATION: u16 = 1000;

/// Sleep between polls when the sensor hands back the same frame twice
pub const DUPLICATE_FRAME_BACKOFF: Duration = Duration::from_millis(10);

/// Minimum number of marker spheres for a tool definition
pub const MIN_TOOL_SPHERES: usize = 3;

/// Default low-pass factor applied to tool rotation
pub const DEFAULT_LOWPASS_ROTATION: f32 = 0.3;

/// Default low-pass factor applied to tool position
pub const DEFAULT_LOWPASS_POSITION: f32 = 0.6;

/// Host units (meters) to tracker units (millimeters)
pub const METERS_TO_MILLIMETERS: f32 = 1000.0;

/// Native short-throw depth resolution
pub mod ahat {
    /// Frame width in pixels
    pub const WIDTH: u32 = 512;
    /// Frame height in pixels
    pub const HEIGHT: u32 = 512;
    /// Bytes per depth pixel
    pub const BYTES_PER_PIXEL: u32 = 2;
    /// Nominal frame interval (45 fps)
    pub const FRAME_INTERVAL_MS: u64 = 22;
}

/// Device timestamps are counted in 100ns ticks
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Convert a device tick count to a [`Duration`]
pub fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_nanos(ticks.saturating_mul(100))
}

/// Convert a [`Duration`] to device ticks (truncating)
pub fn duration_to_ticks(duration: Duration) -> u64 {
    (duration.as_nanos() / 100) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion() {
        assert_eq!(ticks_to_duration(TICKS_PER_SECOND), Duration::from_secs(1));
        assert_eq!(duration_to_ticks(Duration::from_millis(1)), 10_000);
        assert_eq!(duration_to_ticks(ticks_to_duration(12_345)), 12_345);
    }

    #[test]
    fn test_clip_ordering() {
        assert!(DEPTH_NEAR_CLIP_MM < VISUALIZATION_RANGE_MM);
        assert!(VISUALIZATION_RANGE_MM < DEPTH_FAR_CLIP_MM);
    }
}

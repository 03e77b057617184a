// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for depth sensor providers

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Sensor kind exposed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// Short-throw depth + active brightness (articulated hand tracking mode)
    DepthAhat,
    /// Long-throw depth
    DepthLongThrow,
    /// Left-front visible light camera
    LeftFront,
    /// Right-front visible light camera
    RightFront,
    /// Accelerometer
    Accelerometer,
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorType::DepthAhat => write!(f, "Depth AHaT"),
            SensorType::DepthLongThrow => write!(f, "Depth Long Throw"),
            SensorType::LeftFront => write!(f, "Left Front"),
            SensorType::RightFront => write!(f, "Right Front"),
            SensorType::Accelerometer => write!(f, "Accelerometer"),
        }
    }
}

/// Sensor descriptor reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub sensor_type: SensorType,
    pub name: String,
}

/// Frame resolution as reported by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32, bytes_per_pixel: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Number of pixels in one frame
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Resolution {
    /// Height first, matching what the sensor SDK prints
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.bytes_per_pixel)
    }
}

/// Callback run when a frame's native resources are handed back
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// One raw capture from the depth sensor
///
/// The buffers belong to the provider for the duration of one loop
/// iteration. The release hook runs on drop, so every path out of an
/// iteration (processed, skipped, errored) returns the frame.
pub struct SensorFrame {
    pub resolution: Resolution,
    /// Depth in millimeters, `width * height` values
    pub depth: Vec<u16>,
    /// Active brightness, `width * height` values
    pub amplitude: Vec<u16>,
    /// Device timestamp in 100ns ticks
    pub timestamp: u64,
    /// Host time when the frame was received (for latency diagnostics)
    pub received_at: Instant,
    release: Option<ReleaseHook>,
}

impl SensorFrame {
    /// Build a frame, validating buffer lengths against the resolution
    pub fn new(
        resolution: Resolution,
        depth: Vec<u16>,
        amplitude: Vec<u16>,
        timestamp: u64,
    ) -> SensorResult<Self> {
        let expected = resolution.pixel_count();
        if depth.len() != expected || amplitude.len() != expected {
            return Err(SensorError::InvalidFrame(format!(
                "expected {} pixels, got depth={} amplitude={}",
                expected,
                depth.len(),
                amplitude.len()
            )));
        }
        Ok(Self {
            resolution,
            depth,
            amplitude,
            timestamp,
            received_at: Instant::now(),
            release: None,
        })
    }

    /// Attach a hook that returns the frame to the provider on drop
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release = Some(hook);
        self
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }
}

impl std::fmt::Debug for SensorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorFrame")
            .field("resolution", &self.resolution)
            .field("timestamp", &self.timestamp)
            .field("pixels", &self.depth.len())
            .finish()
    }
}

impl Drop for SensorFrame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Image point could not be mapped onto the unit plane
///
/// `xy` carries whatever the lens model produced before giving up; it is
/// not normalized and may be meaningless near the edge of the field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnprojectError {
    pub xy: [f32; 2],
}

impl std::fmt::Display for UnprojectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "image point outside the lens model ({}, {})", self.xy[0], self.xy[1])
    }
}

impl std::error::Error for UnprojectError {}

/// Result type for sensor operations
pub type SensorResult<T> = Result<T, SensorError>;

/// Error types for sensor operations
#[derive(Debug, Clone)]
pub enum SensorError {
    /// Sensor provider library not available on this system
    ProviderUnavailable(String),
    /// No sensor of the requested type was enumerated
    SensorNotFound(SensorType),
    /// Interface or extrinsics query failed
    QueryFailed(String),
    /// Stream could not be opened
    OpenFailed(String),
    /// Stream is closed (sensor released or not yet opened)
    StreamClosed,
    /// Frame buffers do not match the reported resolution
    InvalidFrame(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::ProviderUnavailable(msg) => write!(f, "Provider not available: {}", msg),
            SensorError::SensorNotFound(kind) => write!(f, "No {} sensor found", kind),
            SensorError::QueryFailed(msg) => write!(f, "Query failed: {}", msg),
            SensorError::OpenFailed(msg) => write!(f, "Failed to open stream: {}", msg),
            SensorError::StreamClosed => write!(f, "Stream is closed"),
            SensorError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            SensorError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for SensorError {}

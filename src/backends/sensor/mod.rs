// SPDX-License-Identifier: GPL-3.0-only

//! Depth sensor provider abstraction
//!
//! The vendor sensor SDK is reached only through the traits in this module.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   TrackingSession   │
//! └──────────┬──────────┘
//!            │ open_sensor(DepthAhat)
//!            ▼
//! ┌─────────────────────┐
//! │ SensorDevice Trait  │  ← enumeration, sensor creation
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐      ┌──────────────────┐
//! │ DepthSensor Trait   │ ───▶ │ CameraModel Trait│  ← extrinsics, unprojection
//! └─────────────────────┘      └──────────────────┘
//!   stream: open / next / close / release
//! ```
//!
//! The stream half (`DepthSensor`) moves onto the acquisition thread. The
//! calibration half (`CameraModel`) is shared and queried from any thread.

pub mod frame_loop;
pub mod types;

pub use frame_loop::{CaptureLoopController, LoopAction};
pub use types::*;

use nalgebra::Matrix4;
use std::sync::Arc;

/// Sensor device: enumerates sensors and hands out streams
pub trait SensorDevice: Send + Sync {
    /// Enumerate sensors available on this device
    fn enumerate_sensors(&self) -> SensorResult<Vec<SensorDescriptor>>;

    /// Create a sensor handle for the given type
    ///
    /// # Returns
    /// * `Ok(Box<dyn DepthSensor>)` - Sensor acquired (stream not yet open)
    /// * `Err(SensorError::SensorNotFound)` - Device has no such sensor
    fn open_sensor(&self, sensor_type: SensorType) -> SensorResult<Box<dyn DepthSensor>>;
}

/// Streaming half of a depth sensor
///
/// Owned by exactly one thread at a time. `get_next_buffer` may block
/// until the hardware delivers the next frame.
pub trait DepthSensor: Send {
    /// Sensor type this handle streams
    fn sensor_type(&self) -> SensorType;

    /// Calibration data for this sensor (shareable across threads)
    fn camera_model(&self) -> Arc<dyn CameraModel>;

    /// Open the hardware stream
    fn open_stream(&mut self) -> SensorResult<()>;

    /// Pull the next frame (blocks on hardware cadence)
    ///
    /// The same frame may be returned twice when the hardware has not
    /// produced a new one; callers deduplicate on the frame timestamp.
    fn get_next_buffer(&mut self) -> SensorResult<SensorFrame>;

    /// Close the hardware stream
    fn close_stream(&mut self) -> SensorResult<()>;

    /// Release the sensor handle; the sensor is unusable afterwards
    fn release(&mut self);
}

/// Static calibration of a camera sensor
pub trait CameraModel: Send + Sync {
    /// Extrinsics matrix from the rig frame to the camera frame
    /// (column-vector convention, translation in the last column)
    fn extrinsics(&self) -> SensorResult<Matrix4<f32>>;

    /// Map an image point (pixel coordinates) to the camera's z = 1 plane
    fn map_image_point_to_unit_plane(&self, uv: [f32; 2]) -> Result<[f32; 2], UnprojectError>;
}

/// Find the descriptor of the first sensor of the given type
pub fn find_sensor(
    descriptors: &[SensorDescriptor],
    sensor_type: SensorType,
) -> Option<&SensorDescriptor> {
    descriptors.iter().find(|d| d.sensor_type == sensor_type)
}

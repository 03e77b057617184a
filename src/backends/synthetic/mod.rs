// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic device backend
//!
//! Stands in for the head-mounted device when no hardware is present:
//!
//! - [`SyntheticDevice`] enumerates a short-throw depth sensor and a few
//!   other sensors, and opens [`SyntheticSensor`] streams
//! - [`PinholeModel`] provides the lens model and extrinsics
//! - [`ScriptedLocator`] moves the device along a scripted path
//! - [`ImmediateConsent`] answers consent requests from a helper thread
//!
//! Used by the command-line tool and the integration tests.

mod intrinsics;
mod locator;
mod sensor;

pub use intrinsics::PinholeModel;
pub use locator::{Motion, ScriptedLocator};
pub use sensor::{SensorCounters, SyntheticSensor};

use std::sync::Arc;
use std::thread;
use tracing::debug;

use crate::backends::consent::{Capability, ConsentCallback, ConsentService, ConsentStatus};
use crate::backends::sensor::{
    DepthSensor, SensorDescriptor, SensorDevice, SensorError, SensorResult, SensorType,
};
use crate::config::SyntheticConfig;

/// Simulated sensor device
pub struct SyntheticDevice {
    config: SyntheticConfig,
    camera: Arc<PinholeModel>,
    counters: Arc<SensorCounters>,
    script: Option<Vec<u64>>,
    has_depth: bool,
    stream_fails: bool,
}

impl SyntheticDevice {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            camera: Arc::new(PinholeModel::for_resolution(config.width, config.height)),
            config,
            counters: Arc::new(SensorCounters::default()),
            script: None,
            has_depth: true,
            stream_fails: false,
        }
    }

    /// Deliver exactly these timestamps, then report the stream closed
    ///
    /// Each opened stream replays the script from the start.
    pub fn with_timestamps(mut self, timestamps: Vec<u64>) -> Self {
        self.script = Some(timestamps);
        self
    }

    /// Replace the lens model
    pub fn with_camera_model(mut self, model: PinholeModel) -> Self {
        self.camera = Arc::new(model);
        self
    }

    /// Device without a short-throw depth sensor
    pub fn without_depth_sensor(mut self) -> Self {
        self.has_depth = false;
        self
    }

    /// Device whose depth sensor opens but refuses to stream
    pub fn with_failing_stream(mut self) -> Self {
        self.stream_fails = true;
        self
    }

    /// Counters shared by every stream this device opens
    pub fn counters(&self) -> Arc<SensorCounters> {
        Arc::clone(&self.counters)
    }
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl SensorDevice for SyntheticDevice {
    fn enumerate_sensors(&self) -> SensorResult<Vec<SensorDescriptor>> {
        let mut kinds = vec![
            SensorType::LeftFront,
            SensorType::RightFront,
            SensorType::Accelerometer,
        ];
        if self.has_depth {
            kinds.insert(0, SensorType::DepthAhat);
        }
        Ok(kinds
            .into_iter()
            .map(|sensor_type| SensorDescriptor {
                sensor_type,
                name: format!("synthetic {}", sensor_type),
            })
            .collect())
    }

    fn open_sensor(&self, sensor_type: SensorType) -> SensorResult<Box<dyn DepthSensor>> {
        if sensor_type != SensorType::DepthAhat || !self.has_depth {
            return Err(SensorError::SensorNotFound(sensor_type));
        }
        debug!(width = self.config.width, height = self.config.height, "Opening synthetic sensor");
        let sensor = SyntheticSensor::new(
            &self.config,
            Arc::clone(&self.camera),
            Arc::clone(&self.counters),
            self.script.clone(),
        );
        if self.stream_fails {
            return Ok(Box::new(sensor.failing_open()));
        }
        Ok(Box::new(sensor))
    }
}

/// Consent service with preset answers
///
/// A capability without an answer has its callback dropped unanswered.
#[derive(Debug, Clone, Copy)]
pub struct ImmediateConsent {
    camera: Option<ConsentStatus>,
    imu: Option<ConsentStatus>,
}

impl ImmediateConsent {
    pub fn new(camera: Option<ConsentStatus>, imu: Option<ConsentStatus>) -> Self {
        Self { camera, imu }
    }

    pub fn allow_all() -> Self {
        Self::new(Some(ConsentStatus::Allowed), Some(ConsentStatus::Allowed))
    }

    /// Same answer for the camera, IMU allowed
    pub fn camera(status: ConsentStatus) -> Self {
        Self::new(Some(status), Some(ConsentStatus::Allowed))
    }
}

impl ConsentService for ImmediateConsent {
    fn request_access(&self, capability: Capability, on_complete: ConsentCallback) {
        let answer = match capability {
            Capability::Camera => self.camera,
            Capability::Imu => self.imu,
        };
        let Some(status) = answer else {
            debug!(%capability, "Dropping consent request unanswered");
            return;
        };
        // Answer from another thread, like the platform does
        let spawned = thread::Builder::new()
            .name("consent".to_string())
            .spawn(move || on_complete(status));
        if let Err(e) = spawned {
            debug!(error = %e, "Failed to spawn consent thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::consent::ConsentGate;
    use crate::backends::sensor::find_sensor;

    #[test]
    fn test_enumeration() {
        let device = SyntheticDevice::default();
        let sensors = device.enumerate_sensors().unwrap();
        assert!(find_sensor(&sensors, SensorType::DepthAhat).is_some());

        let device = SyntheticDevice::default().without_depth_sensor();
        let sensors = device.enumerate_sensors().unwrap();
        assert!(find_sensor(&sensors, SensorType::DepthAhat).is_none());
        assert!(matches!(
            device.open_sensor(SensorType::DepthAhat),
            Err(SensorError::SensorNotFound(SensorType::DepthAhat))
        ));
    }

    #[test]
    fn test_only_depth_sensor_opens() {
        let device = SyntheticDevice::default();
        assert!(device.open_sensor(SensorType::LeftFront).is_err());
        let sensor = device.open_sensor(SensorType::DepthAhat).unwrap();
        assert_eq!(sensor.sensor_type(), SensorType::DepthAhat);
    }

    #[test]
    fn test_immediate_consent() {
        let gate = ConsentGate::new();
        let service = ImmediateConsent::new(Some(ConsentStatus::DeniedByUser), None);
        gate.request_consent(&service, Capability::Camera);
        gate.request_consent(&service, Capability::Imu);

        assert!(gate.await_consent(Capability::Camera).unwrap_err().is_access_denied());
        assert!(matches!(
            gate.await_consent(Capability::Imu),
            Err(crate::errors::TrackingError::Unexpected(Capability::Imu))
        ));
    }
}

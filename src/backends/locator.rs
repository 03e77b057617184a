// SPDX-License-Identifier: GPL-3.0-only

//! Spatial locator abstraction
//!
//! The device's spatial-tracking service answers "where was the rig at this
//! instant, expressed in that coordinate system". A missing answer (tracking
//! lost, timestamp outside the history window) is a normal condition.

use nalgebra::{Isometry3, Matrix4, Translation3, UnitQuaternion, Vector3};

/// Coordinate system the device pose is expressed in
///
/// The host sets this once before acquisition starts; otherwise the
/// default frame is used.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFrame {
    pub name: String,
    /// Pose of this frame's origin in the locator's native frame
    pub origin: Isometry3<f32>,
}

impl ReferenceFrame {
    pub fn new(name: impl Into<String>, origin: Isometry3<f32>) -> Self {
        Self {
            name: name.into(),
            origin,
        }
    }

    /// Express a pose given in the locator's native frame in this frame
    pub fn relative(&self, native: &Isometry3<f32>) -> Isometry3<f32> {
        self.origin.inverse() * native
    }
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        Self::new("default", Isometry3::identity())
    }
}

/// Device rig location at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLocation {
    pub position: Vector3<f32>,
    pub orientation: UnitQuaternion<f32>,
}

impl DeviceLocation {
    pub fn new(position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Rotate first, then translate
    pub fn to_matrix(&self) -> Matrix4<f32> {
        self.to_isometry().to_homogeneous()
    }
}

impl From<Isometry3<f32>> for DeviceLocation {
    fn from(iso: Isometry3<f32>) -> Self {
        Self::new(iso.translation.vector, iso.rotation)
    }
}

/// Spatial-tracking service of the device
pub trait SpatialLocator: Send + Sync {
    /// Locate the device rig at `timestamp` (100ns device ticks) in `reference`
    ///
    /// Returns `None` when the pose is unknown at that instant.
    fn try_locate(&self, timestamp: u64, reference: &ReferenceFrame) -> Option<DeviceLocation>;
}

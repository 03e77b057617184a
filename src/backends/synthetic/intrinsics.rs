// SPDX-License-Identifier: GPL-3.0-only

//! Pinhole lens model for the synthetic short-throw sensor
//!
//! The short-throw depth camera has a wide field of view whose usable image
//! is a circle inscribed in the square sensor. Pixels outside that circle
//! have no valid unprojection and report the raw plane coordinate as an
//! error, like the vendor lens model does.

use nalgebra::{Isometry3, Matrix4, Vector3};

use crate::backends::sensor::{CameraModel, SensorResult, UnprojectError};
use crate::constants::ahat;

/// Focal length X (pixels) at 512x512 base resolution
pub const FX: f32 = 217.5;
/// Focal length Y (pixels) at 512x512 base resolution
pub const FY: f32 = 217.5;
/// Principal point X (pixels) at 512x512 base resolution
pub const CX: f32 = 256.0;
/// Principal point Y (pixels) at 512x512 base resolution
pub const CY: f32 = 256.0;
/// Radius of the usable image circle (pixels) at base resolution
pub const IMAGE_CIRCLE_RADIUS: f32 = 256.0;

/// Base width for intrinsics scaling
pub const BASE_WIDTH: f32 = ahat::WIDTH as f32;
/// Base height for intrinsics scaling
pub const BASE_HEIGHT: f32 = ahat::HEIGHT as f32;

/// Camera offset 9 cm along -z and 2 cm down from the rig origin, pitched down
fn default_extrinsics() -> Matrix4<f32> {
    let camera_in_rig = Isometry3::new(
        Vector3::new(0.0, -0.02, -0.09),
        Vector3::new(-0.12, 0.0, 0.0),
    );
    // Extrinsics map rig coordinates into the camera frame
    camera_in_rig.inverse().to_homogeneous()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PinholeModel {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub image_circle_radius: f32,
    pub extrinsics: Matrix4<f32>,
}

impl PinholeModel {
    /// Intrinsics scaled from the 512x512 base calibration
    pub fn for_resolution(width: u32, height: u32) -> Self {
        let sx = width as f32 / BASE_WIDTH;
        let sy = height as f32 / BASE_HEIGHT;
        Self {
            fx: FX * sx,
            fy: FY * sy,
            cx: CX * sx,
            cy: CY * sy,
            image_circle_radius: IMAGE_CIRCLE_RADIUS * sx.min(sy),
            extrinsics: default_extrinsics(),
        }
    }

    pub fn with_extrinsics(mut self, extrinsics: Matrix4<f32>) -> Self {
        self.extrinsics = extrinsics;
        self
    }
}

impl Default for PinholeModel {
    fn default() -> Self {
        Self::for_resolution(ahat::WIDTH, ahat::HEIGHT)
    }
}

impl CameraModel for PinholeModel {
    fn extrinsics(&self) -> SensorResult<Matrix4<f32>> {
        Ok(self.extrinsics)
    }

    fn map_image_point_to_unit_plane(&self, uv: [f32; 2]) -> Result<[f32; 2], UnprojectError> {
        let du = uv[0] - self.cx;
        let dv = uv[1] - self.cy;
        let xy = [du / self.fx, dv / self.fy];
        if (du * du + dv * dv).sqrt() > self.image_circle_radius {
            return Err(UnprojectError { xy });
        }
        Ok(xy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_point_maps_to_axis() {
        let model = PinholeModel::default();
        assert_eq!(model.map_image_point_to_unit_plane([CX, CY]), Ok([0.0, 0.0]));
    }

    #[test]
    fn test_corners_are_outside_image_circle() {
        let model = PinholeModel::default();
        let err = model.map_image_point_to_unit_plane([0.5, 0.5]).unwrap_err();
        assert!(err.xy[0] < 0.0 && err.xy[1] < 0.0);
    }

    #[test]
    fn test_scaled_intrinsics() {
        let model = PinholeModel::for_resolution(256, 256);
        assert_eq!(model.cx, 128.0);
        assert_eq!(model.fx, FX / 2.0);
        assert_eq!(model.image_circle_radius, 128.0);
    }

    #[test]
    fn test_extrinsics_are_invertible() {
        let model = PinholeModel::default();
        assert!(model.extrinsics().unwrap().try_inverse().is_some());
    }
}

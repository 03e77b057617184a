// SPDX-License-Identifier: GPL-3.0-only

//! Depth-camera pose resolution
//!
//! Matrices use the column-vector convention (`p' = M · p`, translation in
//! the last column). The sensor extrinsics map rig coordinates into camera
//! coordinates, so the camera-to-world transform for one frame is
//! `device_to_world · extrinsics⁻¹`.

use nalgebra::{Matrix4, RealField};
use std::fmt::Write;
use tracing::debug;

use crate::backends::locator::{ReferenceFrame, SpatialLocator};
use crate::errors::{TrackingError, TrackingResult};

/// Translation plus unit quaternion, as handed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub translation: [f32; 3],
    /// `x, y, z, w`
    pub rotation: [f32; 4],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    /// Flatten to `tx, ty, tz, qx, qy, qz, qw`
    pub fn to_array(&self) -> [f32; 7] {
        let [tx, ty, tz] = self.translation;
        let [qx, qy, qz, qw] = self.rotation;
        [tx, ty, tz, qx, qy, qz, qw]
    }
}

/// Copy the sign of `reference` onto `value`, treating zero as positive
#[inline]
fn signed<T: RealField + Copy>(value: T, reference: T) -> T {
    if value * reference >= T::zero() { value } else { -value }
}

/// Quaternion `x, y, z, w` of the rotation part of a rigid transform
///
/// Each component is recovered from the diagonal and its sign from the
/// matching off-diagonal difference. The result is unit length for proper
/// rotations up to floating-point error.
pub fn rotation_to_quaternion<T: RealField + Copy>(m: &Matrix4<T>) -> [T; 4] {
    let one = T::one();
    let half: T = nalgebra::convert(0.5);
    let (m00, m11, m22) = (m[(0, 0)], m[(1, 1)], m[(2, 2)]);

    let w = (one + m00 + m11 + m22).max(T::zero()).sqrt() * half;
    let x = (one + m00 - m11 - m22).max(T::zero()).sqrt() * half;
    let y = (one - m00 + m11 - m22).max(T::zero()).sqrt() * half;
    let z = (one - m00 - m11 + m22).max(T::zero()).sqrt() * half;

    [
        signed(x, m[(2, 1)] - m[(1, 2)]),
        signed(y, m[(0, 2)] - m[(2, 0)]),
        signed(z, m[(1, 0)] - m[(0, 1)]),
        w,
    ]
}

/// Split a rigid 4x4 transform into translation and quaternion
pub fn decompose_rigid_transform(m: &Matrix4<f32>) -> Pose {
    Pose {
        translation: [m[(0, 3)], m[(1, 3)], m[(2, 3)]],
        rotation: rotation_to_quaternion(m),
    }
}

/// Render a matrix as four rows of `v,v,v,v,`
pub fn format_matrix(m: &Matrix4<f32>) -> String {
    let mut out = String::new();
    for row in 0..4 {
        for col in 0..4 {
            let _ = write!(out, "{},", m[(row, col)]);
        }
        out.push('\n');
    }
    out
}

/// Composes sensor extrinsics with the located device pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseResolver {
    extrinsics: Matrix4<f32>,
    extrinsics_inv: Matrix4<f32>,
}

impl PoseResolver {
    /// Capture the sensor extrinsics; fails if they are not invertible
    pub fn new(extrinsics: Matrix4<f32>) -> TrackingResult<Self> {
        let extrinsics_inv = extrinsics.try_inverse().ok_or_else(|| {
            TrackingError::ResourceUnavailable("sensor extrinsics are not invertible".to_string())
        })?;
        Ok(Self {
            extrinsics,
            extrinsics_inv,
        })
    }

    pub fn extrinsics(&self) -> &Matrix4<f32> {
        &self.extrinsics
    }

    /// Camera-to-world transform for a given device-to-world transform
    pub fn camera_to_world(&self, device_to_world: &Matrix4<f32>) -> Matrix4<f32> {
        device_to_world * self.extrinsics_inv
    }

    /// Locate the device at `timestamp` and derive the camera-to-world transform
    ///
    /// `None` means the locator had no pose for that instant; the frame is
    /// skipped.
    pub fn resolve_world_pose(
        &self,
        timestamp: u64,
        reference: &ReferenceFrame,
        locator: &dyn SpatialLocator,
    ) -> Option<Matrix4<f32>> {
        let Some(location) = locator.try_locate(timestamp, reference) else {
            debug!(timestamp, frame = %reference.name, "Device not located");
            return None;
        };
        Some(self.camera_to_world(&location.to_matrix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::locator::DeviceLocation;
    use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct FixedLocator(Option<DeviceLocation>);

    impl SpatialLocator for FixedLocator {
        fn try_locate(
            &self,
            _timestamp: u64,
            _reference: &ReferenceFrame,
        ) -> Option<DeviceLocation> {
            self.0
        }
    }

    #[test]
    fn test_identity_decomposes_to_identity() {
        assert_eq!(decompose_rigid_transform(&Matrix4::identity()), Pose::IDENTITY);
    }

    fn random_rotation(rng: &mut StdRng) -> UnitQuaternion<f64> {
        loop {
            let axis = Vector3::new(
                rng.gen_range(-1.0f64..1.0),
                rng.gen_range(-1.0f64..1.0),
                rng.gen_range(-1.0f64..1.0),
            );
            if axis.norm() > 1e-3 {
                let angle = rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
                return UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle);
            }
        }
    }

    fn equal_up_to_sign(got: [f64; 4], want: [f64; 4], tol: f64) -> bool {
        let same = got.iter().zip(&want).all(|(a, b)| (a - b).abs() < tol);
        let flipped = got.iter().zip(&want).all(|(a, b)| (a + b).abs() < tol);
        same || flipped
    }

    #[test]
    fn test_quaternion_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..1000 {
            let q = random_rotation(&mut rng);
            let got = rotation_to_quaternion(&q.to_homogeneous());
            let want = [q.i, q.j, q.k, q.w];
            assert!(equal_up_to_sign(got, want, 1e-5), "got {:?}, want ±{:?}", got, want);

            let norm = got.iter().map(|c| c * c).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_decompose_single_precision() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let q = random_rotation(&mut rng).cast::<f32>();
            let t = Vector3::new(rng.r#gen::<f32>(), rng.r#gen::<f32>(), rng.r#gen::<f32>());
            let m = Isometry3::from_parts(Translation3::from(t), q).to_homogeneous();

            let pose = decompose_rigid_transform(&m);
            assert_eq!(pose.translation, [t.x, t.y, t.z]);

            let got = pose.rotation.map(f64::from);
            let want = [q.i, q.j, q.k, q.w].map(f64::from);
            let dot: f64 = got.iter().zip(&want).map(|(a, b)| a * b).sum();
            let sign = if dot >= 0.0 { 1.0 } else { -1.0 };
            for (a, b) in got.iter().zip(&want) {
                // A component of size c comes from sqrt(4c^2 + noise), so f32
                // rounding of the diagonal costs about 1e-7 / c. Components
                // within 0.05 of zero can only be held to the square root of
                // f32 epsilon.
                let tol = if b.abs() > 0.05 { 1e-5 } else { 1e-3 };
                assert!((a * sign - b).abs() < tol, "got {:?}, want ±{:?}", got, want);
            }
        }
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let pose = decompose_rigid_transform(&q.to_homogeneous());
        let half = std::f32::consts::FRAC_1_SQRT_2;
        assert!(pose.rotation[0].abs() < 1e-6);
        assert!(pose.rotation[1].abs() < 1e-6);
        assert!((pose.rotation[2] - half).abs() < 1e-6);
        assert!((pose.rotation[3] - half).abs() < 1e-6);
    }

    #[test]
    fn test_composition_order() {
        // Camera sits 0.1 m along rig x
        let extrinsics = Translation3::new(-0.1, 0.0, 0.0).to_homogeneous();
        let resolver = PoseResolver::new(extrinsics).unwrap();

        let device = DeviceLocation::new(Vector3::new(0.0, 2.0, 0.0), UnitQuaternion::identity());
        let m = resolver
            .resolve_world_pose(1, &ReferenceFrame::default(), &FixedLocator(Some(device)))
            .unwrap();

        let pose = decompose_rigid_transform(&m);
        assert!((pose.translation[0] - 0.1).abs() < 1e-6);
        assert!((pose.translation[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_not_located() {
        let resolver = PoseResolver::new(Matrix4::identity()).unwrap();
        assert!(
            resolver
                .resolve_world_pose(1, &ReferenceFrame::default(), &FixedLocator(None))
                .is_none()
        );
    }

    #[test]
    fn test_singular_extrinsics_rejected() {
        assert!(PoseResolver::new(Matrix4::zeros()).is_err());
    }

    #[test]
    fn test_format_matrix() {
        let text = format_matrix(&Matrix4::identity());
        assert_eq!(text, "1,0,0,0,\n0,1,0,0,\n0,0,1,0,\n0,0,0,1,\n");
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Infrared tool tracker seam
//!
//! Marker detection and pose solving live behind [`ToolTracker`]. The
//! acquisition loop hands each located frame to the tracker together with
//! its camera-to-world transform; the session forwards tool definitions
//! after converting them from host units.
//!
//! Host tool definitions arrive in meters in a left-handed frame. The
//! tracker works in millimeters in the camera's right-handed frame, so
//! marker positions are scaled by 1000 and their z axis is flipped.

mod registry;

pub use registry::ToolRegistry;

use nalgebra::{Matrix4, Vector3};

use crate::config::ToolDefaults;
use crate::constants::{METERS_TO_MILLIMETERS, MIN_TOOL_SPHERES};

/// Axis-aligned volume the tracker restricts its search to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub center: Vector3<f32>,
    pub half_extents: Vector3<f32>,
}

impl RegionOfInterest {
    pub fn new(center: [f32; 3], half_extents: [f32; 3]) -> Self {
        Self {
            center: Vector3::from(center),
            half_extents: Vector3::from(half_extents).abs(),
        }
    }

    /// Whether `point` lies inside the volume (bounds inclusive)
    pub fn contains(&self, point: &Vector3<f32>) -> bool {
        (point - self.center)
            .abs()
            .iter()
            .zip(self.half_extents.iter())
            .all(|(d, h)| d <= h)
    }
}

/// One frame as handed to the tracker
///
/// Buffers borrow the sensor frame and are only valid for the duration of
/// [`ToolTracker::add_frame`]; trackers copy what they keep.
#[derive(Debug, Clone, Copy)]
pub struct TrackerFrame<'a> {
    pub amplitude: &'a [u16],
    pub depth: &'a [u16],
    pub width: u32,
    pub height: u32,
    pub camera_to_world: Matrix4<f32>,
    pub timestamp: u64,
    pub roi: Option<RegionOfInterest>,
}

/// Rejected tool definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDefinitionError {
    /// Fewer spheres than a rigid pose needs
    TooFewSpheres(usize),
    /// Position list does not hold three coordinates per sphere
    PositionCountMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for ToolDefinitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolDefinitionError::TooFewSpheres(count) => write!(
                f,
                "a tool needs at least {} spheres, got {}",
                MIN_TOOL_SPHERES, count
            ),
            ToolDefinitionError::PositionCountMismatch { expected, actual } => {
                write!(f, "expected {} sphere coordinates, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for ToolDefinitionError {}

/// Rigid marker pattern in tracker units (millimeters)
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub id: String,
    pub spheres: Vec<Vector3<f32>>,
    pub sphere_radius: f32,
    pub min_visible_spheres: usize,
    pub lowpass_rotation: f32,
    pub lowpass_position: f32,
}

impl ToolDefinition {
    /// Validate and convert a definition given in host units
    ///
    /// `positions` holds `x, y, z` per sphere in meters. The minimum
    /// visible count defaults to the sphere count.
    pub fn from_host_units(
        id: impl Into<String>,
        sphere_count: usize,
        positions: &[f32],
        sphere_radius: f32,
        defaults: &ToolDefaults,
    ) -> Result<Self, ToolDefinitionError> {
        if sphere_count < MIN_TOOL_SPHERES {
            return Err(ToolDefinitionError::TooFewSpheres(sphere_count));
        }
        let expected = sphere_count * 3;
        if positions.len() != expected {
            return Err(ToolDefinitionError::PositionCountMismatch {
                expected,
                actual: positions.len(),
            });
        }

        let spheres = positions
            .chunks_exact(3)
            .map(|p| {
                Vector3::new(
                    p[0] * METERS_TO_MILLIMETERS,
                    p[1] * METERS_TO_MILLIMETERS,
                    -p[2] * METERS_TO_MILLIMETERS,
                )
            })
            .collect();

        Ok(Self {
            id: id.into(),
            spheres,
            sphere_radius,
            min_visible_spheres: sphere_count,
            lowpass_rotation: 0.0,
            lowpass_position: 0.0,
        }
        .with_smoothing(defaults.lowpass_rotation, defaults.lowpass_position))
    }

    pub fn with_min_visible_spheres(mut self, count: usize) -> Self {
        self.min_visible_spheres = count;
        self
    }

    /// Set the low-pass factors, clamped to `[0, 1]`
    pub fn with_smoothing(mut self, rotation: f32, position: f32) -> Self {
        self.lowpass_rotation = rotation.clamp(0.0, 1.0);
        self.lowpass_position = position.clamp(0.0, 1.0);
        self
    }

    pub fn sphere_count(&self) -> usize {
        self.spheres.len()
    }
}

/// Infrared marker tracker
///
/// Implementations are shared between the session and the acquisition
/// thread, so every method takes `&self`.
pub trait ToolTracker: Send + Sync {
    /// Ingest one frame (called from the acquisition thread)
    fn add_frame(&self, frame: &TrackerFrame<'_>);

    /// Register a tool; `false` if the tracker rejects it
    fn add_tool(&self, tool: ToolDefinition) -> bool;

    /// Unregister a tool by id; `false` if unknown
    fn remove_tool(&self, id: &str) -> bool;

    /// Unregister every tool
    fn remove_all_tools(&self) -> bool;

    /// Begin tracking registered tools
    fn start_tracking(&self) -> bool;

    fn stop_tracking(&self);

    fn is_tracking(&self) -> bool;

    /// Latest tool-to-world transform, if the tool has been seen
    fn tool_transform(&self, id: &str) -> Option<Matrix4<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [f32; 12] = [
        0.0, 0.0, 0.0, //
        0.05, 0.0, 0.0, //
        0.05, 0.05, 0.01, //
        0.0, 0.05, 0.02,
    ];

    #[test]
    fn test_rejects_too_few_spheres() {
        let result =
            ToolDefinition::from_host_units("t", 2, &SQUARE[..6], 0.006, &ToolDefaults::default());
        assert_eq!(result, Err(ToolDefinitionError::TooFewSpheres(2)));
    }

    #[test]
    fn test_rejects_position_mismatch() {
        let result =
            ToolDefinition::from_host_units("t", 4, &SQUARE[..11], 0.006, &ToolDefaults::default());
        assert_eq!(
            result,
            Err(ToolDefinitionError::PositionCountMismatch {
                expected: 12,
                actual: 11
            })
        );
    }

    #[test]
    fn test_converts_to_millimeters_and_flips_z() {
        let tool = ToolDefinition::from_host_units("t", 4, &SQUARE, 0.006, &ToolDefaults::default())
            .unwrap();

        assert_eq!(tool.sphere_count(), 4);
        assert_eq!(tool.min_visible_spheres, 4);
        assert_eq!(tool.spheres[1], Vector3::new(50.0, 0.0, 0.0));
        assert!((tool.spheres[3].z - -20.0).abs() < 1e-4);
        assert_eq!(tool.lowpass_rotation, 0.3);
        assert_eq!(tool.lowpass_position, 0.6);
    }

    #[test]
    fn test_smoothing_is_clamped() {
        let tool = ToolDefinition::from_host_units("t", 4, &SQUARE, 0.006, &ToolDefaults::default())
            .unwrap()
            .with_smoothing(1.5, -0.2)
            .with_min_visible_spheres(3);

        assert_eq!(tool.lowpass_rotation, 1.0);
        assert_eq!(tool.lowpass_position, 0.0);
        assert_eq!(tool.min_visible_spheres, 3);
    }

    #[test]
    fn test_roi_contains() {
        let roi = RegionOfInterest::new([0.0, 0.0, 1.0], [0.5, -0.5, 0.5]);
        assert!(roi.contains(&Vector3::new(0.5, 0.0, 1.0)));
        assert!(roi.contains(&Vector3::new(0.0, -0.5, 0.6)));
        assert!(!roi.contains(&Vector3::new(0.0, 0.0, 0.4)));
    }
}

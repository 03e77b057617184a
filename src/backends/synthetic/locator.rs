// SPDX-License-Identifier: GPL-3.0-only

//! Scripted spatial locator

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backends::locator::{DeviceLocation, ReferenceFrame, SpatialLocator};
use crate::constants::ticks_to_duration;

/// How the scripted device moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Device never moves
    Fixed(Isometry3<f32>),
    /// Device walks a horizontal circle around the origin, facing inward
    Orbit {
        radius: f32,
        height: f32,
        period_secs: f32,
    },
    /// Tracking never acquires a pose
    Lost,
}

impl Motion {
    fn pose_at(&self, seconds: f32) -> Option<Isometry3<f32>> {
        match *self {
            Motion::Fixed(pose) => Some(pose),
            Motion::Orbit {
                radius,
                height,
                period_secs,
            } => {
                let angle = std::f32::consts::TAU * seconds / period_secs.max(f32::EPSILON);
                let position = Vector3::new(radius * angle.cos(), height, radius * angle.sin());
                // -z is forward; turn so it points at the orbit center
                let yaw = std::f32::consts::FRAC_PI_2 - angle;
                let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw);
                Some(Isometry3::from_parts(Translation3::from(position), rotation))
            }
            Motion::Lost => None,
        }
    }
}

/// Locator driven by a [`Motion`] script
///
/// Every `lose_every`-th query reports no pose. Queried timestamps are
/// only kept once [`ScriptedLocator::recording_queries`] is enabled.
#[derive(Debug)]
pub struct ScriptedLocator {
    motion: Motion,
    lose_every: u64,
    query_count: AtomicU64,
    queries: Option<Mutex<Vec<u64>>>,
}

impl ScriptedLocator {
    pub fn new(motion: Motion) -> Self {
        Self {
            motion,
            lose_every: 0,
            query_count: AtomicU64::new(0),
            queries: None,
        }
    }

    /// Fixed at the native origin
    pub fn stationary() -> Self {
        Self::new(Motion::Fixed(Isometry3::identity()))
    }

    /// Orbit of 1.5 m at head height, one lap per 20 s
    pub fn orbit() -> Self {
        Self::new(Motion::Orbit {
            radius: 1.5,
            height: 1.6,
            period_secs: 20.0,
        })
    }

    pub fn losing_every(mut self, n: u64) -> Self {
        self.lose_every = n;
        self
    }

    /// Keep every queried timestamp
    pub fn recording_queries(mut self) -> Self {
        self.queries = Some(Mutex::new(Vec::new()));
        self
    }

    /// Timestamps queried so far, in order; empty unless recording
    pub fn queried_timestamps(&self) -> Vec<u64> {
        self.queries.as_ref().map_or_else(Vec::new, |queries| {
            queries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        })
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }
}

impl SpatialLocator for ScriptedLocator {
    fn try_locate(&self, timestamp: u64, reference: &ReferenceFrame) -> Option<DeviceLocation> {
        let query = self.query_count.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(queries) = &self.queries {
            queries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(timestamp);
        }
        if self.lose_every > 0 && query % self.lose_every == 0 {
            return None;
        }

        let seconds = ticks_to_duration(timestamp).as_secs_f32();
        let native = self.motion.pose_at(seconds)?;
        Some(DeviceLocation::from(reference.relative(&native)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_motion() {
        let locator = ScriptedLocator::new(Motion::Lost).recording_queries();
        assert!(locator.try_locate(1, &ReferenceFrame::default()).is_none());
        assert_eq!(locator.queried_timestamps(), vec![1]);
    }

    #[test]
    fn test_queries_not_kept_by_default() {
        let locator = ScriptedLocator::stationary();
        let reference = ReferenceFrame::default();
        for ts in 1..=100 {
            locator.try_locate(ts, &reference);
        }
        assert!(locator.queried_timestamps().is_empty());
        assert_eq!(locator.query_count(), 100);
    }

    #[test]
    fn test_losing_every() {
        let locator = ScriptedLocator::stationary().losing_every(2);
        let reference = ReferenceFrame::default();
        let located: Vec<bool> = (1..=4)
            .map(|ts| locator.try_locate(ts, &reference).is_some())
            .collect();
        assert_eq!(located, vec![true, false, true, false]);
    }

    #[test]
    fn test_orbit_faces_center() {
        let locator = ScriptedLocator::orbit();
        let location = locator.try_locate(0, &ReferenceFrame::default()).unwrap();
        assert!((location.position.x - 1.5).abs() < 1e-5);

        let forward = location.orientation * Vector3::new(0.0, 0.0, -1.0);
        let to_center = (Vector3::new(0.0, 1.6, 0.0) - location.position).normalize();
        assert!((forward - to_center).norm() < 1e-5);
    }

    #[test]
    fn test_reference_frame_is_applied() {
        let locator = ScriptedLocator::stationary();
        let reference = ReferenceFrame::new(
            "shifted",
            Isometry3::translation(1.0, 0.0, 0.0),
        );
        let location = locator.try_locate(0, &reference).unwrap();
        assert!((location.position.x + 1.0).abs() < 1e-6);
    }
}

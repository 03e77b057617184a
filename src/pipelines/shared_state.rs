// SPDX-License-Identifier: GPL-3.0-only

//! State shared between the acquisition thread and readers
//!
//! The acquisition thread is the only writer of frame products. Buffers
//! are copied in under the exclusive lock and copied out under the shared
//! lock, so a reader never observes a partially written frame. Timestamps
//! and update flags are atomics.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backends::locator::ReferenceFrame;
use crate::backends::sensor::Resolution;
use crate::pipelines::pose::Pose;
use crate::tracker::RegionOfInterest;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Products of one located frame
#[derive(Debug, Clone, Copy)]
pub struct FrameProducts<'a> {
    pub resolution: Resolution,
    pub depth: &'a [u8],
    pub amplitude: &'a [u8],
    pub pose: Pose,
    pub timestamp: u64,
}

#[derive(Debug, Default)]
pub struct SharedStateStore {
    depth: RwLock<Vec<u8>>,
    amplitude: RwLock<Vec<u8>>,
    depth_updated: AtomicBool,
    amplitude_updated: AtomicBool,
    pose: RwLock<Pose>,
    resolution: RwLock<Option<Resolution>>,
    last_depth_timestamp: AtomicU64,
    last_tracked_timestamp: AtomicU64,
    depth_offset: AtomicU16,
    roi: RwLock<Option<RegionOfInterest>>,
    reference_frame: RwLock<ReferenceFrame>,
}

impl SharedStateStore {
    pub fn new() -> Self {
        Self {
            pose: RwLock::new(Pose::IDENTITY),
            ..Default::default()
        }
    }

    /// Publish the products of one frame (acquisition thread only)
    pub fn publish(&self, products: FrameProducts<'_>) {
        {
            let mut depth = write(&self.depth);
            depth.clear();
            depth.extend_from_slice(products.depth);
        }
        {
            let mut amplitude = write(&self.amplitude);
            amplitude.clear();
            amplitude.extend_from_slice(products.amplitude);
        }
        *write(&self.pose) = products.pose;
        *write(&self.resolution) = Some(products.resolution);

        self.last_depth_timestamp
            .store(products.timestamp, Ordering::Release);
        self.depth_updated.store(true, Ordering::Release);
        self.amplitude_updated.store(true, Ordering::Release);
    }

    /// Copy of the latest depth visualization; clears its updated flag
    pub fn take_depth_snapshot(&self) -> Vec<u8> {
        let guard = read(&self.depth);
        self.depth_updated.store(false, Ordering::Release);
        guard.clone()
    }

    /// Copy of the latest amplitude visualization; clears its updated flag
    pub fn take_amplitude_snapshot(&self) -> Vec<u8> {
        let guard = read(&self.amplitude);
        self.amplitude_updated.store(false, Ordering::Release);
        guard.clone()
    }

    /// Latest depth-camera-to-world pose
    pub fn pose(&self) -> Pose {
        *read(&self.pose)
    }

    /// Resolution of the last published frame
    pub fn resolution(&self) -> Option<Resolution> {
        *read(&self.resolution)
    }

    /// Length of the visualization buffers (`width * height`)
    pub fn buffer_size(&self) -> usize {
        self.resolution().map_or(0, |r| r.pixel_count())
    }

    pub fn is_depth_updated(&self) -> bool {
        self.depth_updated.load(Ordering::Acquire)
    }

    pub fn is_amplitude_updated(&self) -> bool {
        self.amplitude_updated.load(Ordering::Acquire)
    }

    pub fn last_depth_timestamp(&self) -> u64 {
        self.last_depth_timestamp.load(Ordering::Acquire)
    }

    pub fn last_tracked_timestamp(&self) -> u64 {
        self.last_tracked_timestamp.load(Ordering::Acquire)
    }

    /// Record `timestamp` as forwarded to the tracker if it is newer
    ///
    /// Returns `false` (and records nothing) for stale or repeated frames.
    pub fn advance_tracked_timestamp(&self, timestamp: u64) -> bool {
        self.last_tracked_timestamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (timestamp > last).then_some(timestamp)
            })
            .is_ok()
    }

    pub fn depth_offset(&self) -> u16 {
        self.depth_offset.load(Ordering::Relaxed)
    }

    pub fn set_depth_offset(&self, offset: u16) {
        self.depth_offset.store(offset, Ordering::Relaxed);
    }

    pub fn region_of_interest(&self) -> Option<RegionOfInterest> {
        *read(&self.roi)
    }

    pub fn set_region_of_interest(&self, roi: Option<RegionOfInterest>) {
        *write(&self.roi) = roi;
    }

    pub fn reference_frame(&self) -> ReferenceFrame {
        read(&self.reference_frame).clone()
    }

    pub fn set_reference_frame(&self, frame: ReferenceFrame) {
        *write(&self.reference_frame) = frame;
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Headless tool tracker
//!
//! Keeps tool definitions and frame bookkeeping without running marker
//! detection. Tool poses are supplied from outside with
//! [`ToolRegistry::set_tool_transform`], which makes the registry usable
//! as a stand-in tracker for the CLI and for tests. A tool whose position
//! falls outside the region of interest of the last frame is not reported.

use nalgebra::{Matrix4, Vector3};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::{RegionOfInterest, ToolDefinition, ToolTracker, TrackerFrame};

#[derive(Debug, Default)]
struct RegistryState {
    tools: HashMap<String, ToolDefinition>,
    transforms: HashMap<String, Matrix4<f32>>,
    last_camera_to_world: Option<Matrix4<f32>>,
    last_roi: Option<RegionOfInterest>,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    state: Mutex<RegistryState>,
    tracking: AtomicBool,
    frames_received: AtomicU64,
    last_frame_timestamp: AtomicU64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Definition registered under `id`
    pub fn tool(&self, id: &str) -> Option<ToolDefinition> {
        self.state().tools.get(id).cloned()
    }

    pub fn tool_count(&self) -> usize {
        self.state().tools.len()
    }

    /// Report a pose for a registered tool; ignored for unknown ids
    pub fn set_tool_transform(&self, id: &str, transform: Matrix4<f32>) -> bool {
        let mut state = self.state();
        if !state.tools.contains_key(id) {
            return false;
        }
        state.transforms.insert(id.to_string(), transform);
        true
    }

    /// Frames ingested while tracking
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Acquire)
    }

    pub fn last_frame_timestamp(&self) -> u64 {
        self.last_frame_timestamp.load(Ordering::Acquire)
    }

    pub fn last_camera_to_world(&self) -> Option<Matrix4<f32>> {
        self.state().last_camera_to_world
    }

    pub fn last_region_of_interest(&self) -> Option<RegionOfInterest> {
        self.state().last_roi
    }
}

impl ToolTracker for ToolRegistry {
    fn add_frame(&self, frame: &TrackerFrame<'_>) {
        if !self.is_tracking() {
            return;
        }
        {
            let mut state = self.state();
            state.last_camera_to_world = Some(frame.camera_to_world);
            state.last_roi = frame.roi;
        }
        self.last_frame_timestamp
            .store(frame.timestamp, Ordering::Release);
        let count = self.frames_received.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            timestamp = frame.timestamp,
            width = frame.width,
            height = frame.height,
            count,
            "Tracker frame"
        );
    }

    fn add_tool(&self, tool: ToolDefinition) -> bool {
        let mut state = self.state();
        if state.tools.contains_key(&tool.id) {
            warn!(id = %tool.id, "Tool already registered");
            return false;
        }
        info!(id = %tool.id, spheres = tool.sphere_count(), "Tool registered");
        state.tools.insert(tool.id.clone(), tool);
        true
    }

    fn remove_tool(&self, id: &str) -> bool {
        let mut state = self.state();
        state.transforms.remove(id);
        state.tools.remove(id).is_some()
    }

    fn remove_all_tools(&self) -> bool {
        let mut state = self.state();
        state.transforms.clear();
        state.tools.clear();
        true
    }

    fn start_tracking(&self) -> bool {
        if self.tool_count() == 0 {
            warn!("No tools registered, not starting tracking");
            return false;
        }
        self.tracking.store(true, Ordering::Release);
        info!("Tool tracking started");
        true
    }

    fn stop_tracking(&self) {
        if self.tracking.swap(false, Ordering::AcqRel) {
            info!("Tool tracking stopped");
        }
    }

    fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    fn tool_transform(&self, id: &str) -> Option<Matrix4<f32>> {
        let state = self.state();
        let transform = state.transforms.get(id).copied()?;
        let position = Vector3::new(transform[(0, 3)], transform[(1, 3)], transform[(2, 3)]);
        match state.last_roi {
            Some(roi) if !roi.contains(&position) => None,
            _ => Some(transform),
        }
    }
}

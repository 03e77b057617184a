// SPDX-License-Identifier: GPL-3.0-only

//! Tracking session facade
//!
//! [`TrackingSession`] is the surface a host application talks to. It
//! wires the platform collaborators (sensor device, consent service,
//! spatial locator, tool tracker) to the acquisition pipeline and exposes
//! copy-out accessors for everything the pipeline produces.

use nalgebra::Matrix4;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backends::consent::{Capability, ConsentGate, ConsentService};
use crate::backends::locator::{ReferenceFrame, SpatialLocator};
use crate::backends::sensor::{
    CameraModel, DepthSensor, Resolution, SensorDevice, SensorType, find_sensor,
};
use crate::config::Config;
use crate::errors::{TrackingError, TrackingResult};
use crate::pipelines::{
    AcquisitionContext, AcquisitionLoop, AcquisitionStats, LutCache, PoseResolver,
    SharedStateStore, UnitRayLut, decompose_rigid_transform, format_matrix,
};
use crate::tracker::{RegionOfInterest, ToolDefinition, ToolTracker};

/// Depth acquisition and tool tracking session for one device
pub struct TrackingSession {
    id: Uuid,
    config: Config,
    device: Arc<dyn SensorDevice>,
    consent: ConsentGate,
    camera: Arc<dyn CameraModel>,
    resolver: PoseResolver,
    locator: Arc<dyn SpatialLocator>,
    tracker: Arc<dyn ToolTracker>,
    store: Arc<SharedStateStore>,
    lut: Arc<LutCache>,
    stats: Arc<AcquisitionStats>,
    acquisition: AcquisitionLoop,
    /// Sensor opened during construction, handed to the first worker
    idle_sensor: Mutex<Option<Box<dyn DepthSensor>>>,
}

impl TrackingSession {
    /// Request consent and initialize the short-throw depth sensor
    ///
    /// Consent is requested for both the camera and the motion sensors but
    /// only awaited when acquisition starts. Fails with
    /// `ResourceUnavailable` if the device has no short-throw depth sensor
    /// or its calibration cannot be read.
    pub fn new(
        device: Arc<dyn SensorDevice>,
        consent_service: &dyn ConsentService,
        locator: Arc<dyn SpatialLocator>,
        tracker: Arc<dyn ToolTracker>,
        config: Config,
    ) -> TrackingResult<Self> {
        let id = Uuid::new_v4();

        let consent = ConsentGate::new();
        consent.request_consent(consent_service, Capability::Camera);
        consent.request_consent(consent_service, Capability::Imu);

        let descriptors = device.enumerate_sensors().map_err(|e| {
            TrackingError::ResourceUnavailable(format!("sensor enumeration failed: {}", e))
        })?;
        if find_sensor(&descriptors, SensorType::DepthAhat).is_none() {
            return Err(TrackingError::ResourceUnavailable(format!(
                "no {} sensor among {} enumerated",
                SensorType::DepthAhat,
                descriptors.len()
            )));
        }

        let sensor = device
            .open_sensor(SensorType::DepthAhat)
            .map_err(|e| TrackingError::ResourceUnavailable(e.to_string()))?;
        let camera = sensor.camera_model();
        let extrinsics = camera
            .extrinsics()
            .map_err(|e| TrackingError::ResourceUnavailable(e.to_string()))?;
        let resolver = PoseResolver::new(extrinsics)?;

        info!(session = %id, sensors = descriptors.len(), "Short-throw depth sensor initialized");

        Ok(Self {
            id,
            config,
            device,
            consent,
            camera,
            resolver,
            locator,
            tracker,
            store: Arc::new(SharedStateStore::new()),
            lut: Arc::new(LutCache::new()),
            stats: Arc::new(AcquisitionStats::default()),
            acquisition: AcquisitionLoop::new(),
            idle_sensor: Mutex::new(Some(sensor)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn context(&self) -> AcquisitionContext {
        AcquisitionContext {
            store: Arc::clone(&self.store),
            lut: Arc::clone(&self.lut),
            stats: Arc::clone(&self.stats),
            resolver: self.resolver,
            camera: Arc::clone(&self.camera),
            locator: Arc::clone(&self.locator),
            tracker: Arc::clone(&self.tracker),
            processing: self.config.processing,
            acquisition: self.config.acquisition,
        }
    }

    fn take_sensor(&self) -> TrackingResult<Box<dyn DepthSensor>> {
        let idle = self
            .idle_sensor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match idle {
            Some(sensor) => Ok(sensor),
            None => self
                .device
                .open_sensor(SensorType::DepthAhat)
                .map_err(|e| TrackingError::ResourceUnavailable(e.to_string())),
        }
    }

    // ===== Lifecycle =====

    /// Wait for camera consent, then start the acquisition thread
    ///
    /// Returns `Ok(false)` if acquisition was already running. Any consent
    /// decision other than allowed fails without spawning a thread.
    pub fn start_acquisition(&self) -> TrackingResult<bool> {
        self.consent.await_consent(Capability::Camera)?;
        let started = self
            .acquisition
            .start(|| self.take_sensor(), self.context())?;
        if started {
            info!(session = %self.id, "Acquisition started");
        }
        Ok(started)
    }

    /// Stop the acquisition thread; safe to call at any time
    pub fn stop_acquisition(&self) {
        self.acquisition.stop();
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquisition.is_running()
    }

    /// Wait for the motion sensor consent decision
    pub fn await_imu_consent(&self) -> TrackingResult<()> {
        self.consent.await_consent(Capability::Imu)
    }

    /// Coordinate system device poses are expressed in
    ///
    /// Meant to be set before acquisition starts; until then the default
    /// frame is used.
    pub fn set_reference_frame(&self, frame: ReferenceFrame) {
        if self.is_acquiring() {
            warn!(
                session = %self.id,
                frame = %frame.name,
                "Reference frame changed while acquiring"
            );
        }
        self.store.set_reference_frame(frame);
    }

    pub fn set_region_of_interest(&self, center: [f32; 3], half_extents: [f32; 3]) {
        self.store
            .set_region_of_interest(Some(RegionOfInterest::new(center, half_extents)));
    }

    pub fn clear_region_of_interest(&self) {
        self.store.set_region_of_interest(None);
    }

    /// Offset subtracted from depth before visualization (mm)
    pub fn set_depth_offset(&self, offset_mm: u16) {
        self.store.set_depth_offset(offset_mm);
    }

    // ===== Queries =====

    /// Pixels per visualization buffer; 0 before the first frame
    pub fn depth_buffer_size(&self) -> usize {
        self.store.buffer_size()
    }

    /// `HxWxBpp` of the last published frame
    pub fn print_depth_resolution(&self) -> String {
        self.store.resolution().unwrap_or_default().to_string()
    }

    pub fn depth_resolution(&self) -> Option<Resolution> {
        self.store.resolution()
    }

    /// Sensor extrinsics as four rows of `v,v,v,v,`
    pub fn print_depth_extrinsics(&self) -> String {
        format_matrix(self.resolver.extrinsics())
    }

    /// Sensor extrinsics as translation plus quaternion
    pub fn encoded_extrinsics(&self) -> [f32; 7] {
        decompose_rigid_transform(self.resolver.extrinsics()).to_array()
    }

    pub fn last_depth_timestamp(&self) -> u64 {
        self.store.last_depth_timestamp()
    }

    pub fn last_tracked_timestamp(&self) -> u64 {
        self.store.last_tracked_timestamp()
    }

    pub fn is_lut_ready(&self) -> bool {
        self.lut.is_ready()
    }

    pub fn is_depth_updated(&self) -> bool {
        self.store.is_depth_updated()
    }

    pub fn is_amplitude_updated(&self) -> bool {
        self.store.is_amplitude_updated()
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    // ===== Data export =====

    /// Copy of the depth visualization (empty before the first frame);
    /// clears the updated flag
    pub fn depth_texture_buffer(&self) -> Vec<u8> {
        self.store.take_depth_snapshot()
    }

    /// Copy of the amplitude visualization; clears the updated flag
    pub fn amplitude_texture_buffer(&self) -> Vec<u8> {
        self.store.take_amplitude_snapshot()
    }

    /// `tx, ty, tz, qx, qy, qz, qw` of the depth camera in the reference frame
    pub fn depth_to_world_pose(&self) -> [f32; 7] {
        self.store.pose().to_array()
    }

    /// Tool pose as `tx, ty, tz, qx, qy, qz, qw`; all zeros when unknown
    pub fn tool_transform(&self, id: &str) -> [f32; 7] {
        self.tracker
            .tool_transform(id)
            .map(|m: Matrix4<f32>| decompose_rigid_transform(&m).to_array())
            .unwrap_or([0.0; 7])
    }

    /// Map a depth-image pixel coordinate onto the camera's unit plane
    pub fn map_image_point_to_unit_plane(&self, uv: [f32; 2]) -> Option<[f32; 2]> {
        self.camera.map_image_point_to_unit_plane(uv).ok()
    }

    pub fn lut(&self) -> Option<Arc<UnitRayLut>> {
        self.lut.get()
    }

    /// Flat `x, y, z` copy of the unit-ray table
    pub fn lut_snapshot(&self) -> Option<Vec<f32>> {
        self.lut.snapshot()
    }

    // ===== Tool management =====

    /// Register a tool given in host units (meters)
    ///
    /// All spheres must be visible and default smoothing applies.
    pub fn add_tool_definition(
        &self,
        sphere_count: usize,
        sphere_positions: &[f32],
        sphere_radius: f32,
        id: &str,
    ) -> bool {
        self.add_tool(sphere_count, sphere_positions, sphere_radius, id, |tool| tool)
    }

    pub fn add_tool_definition_with_min_visible(
        &self,
        sphere_count: usize,
        sphere_positions: &[f32],
        sphere_radius: f32,
        id: &str,
        min_visible_spheres: usize,
    ) -> bool {
        self.add_tool(sphere_count, sphere_positions, sphere_radius, id, |tool| {
            tool.with_min_visible_spheres(min_visible_spheres)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_tool_definition_with_smoothing(
        &self,
        sphere_count: usize,
        sphere_positions: &[f32],
        sphere_radius: f32,
        id: &str,
        min_visible_spheres: usize,
        lowpass_rotation: f32,
        lowpass_position: f32,
    ) -> bool {
        self.add_tool(sphere_count, sphere_positions, sphere_radius, id, |tool| {
            tool.with_min_visible_spheres(min_visible_spheres)
                .with_smoothing(lowpass_rotation, lowpass_position)
        })
    }

    fn add_tool(
        &self,
        sphere_count: usize,
        sphere_positions: &[f32],
        sphere_radius: f32,
        id: &str,
        customize: impl FnOnce(ToolDefinition) -> ToolDefinition,
    ) -> bool {
        match ToolDefinition::from_host_units(
            id,
            sphere_count,
            sphere_positions,
            sphere_radius,
            &self.config.tool_defaults,
        ) {
            Ok(tool) => self.tracker.add_tool(customize(tool)),
            Err(e) => {
                warn!(session = %self.id, id, error = %e, "Tool definition rejected");
                false
            }
        }
    }

    pub fn remove_tool_definition(&self, id: &str) -> bool {
        self.tracker.remove_tool(id)
    }

    pub fn remove_all_tool_definitions(&self) -> bool {
        self.tracker.remove_all_tools()
    }

    /// Start acquisition if needed, then start the tracker
    pub fn start_tool_tracking(&self) -> bool {
        if let Err(e) = self.start_acquisition() {
            warn!(session = %self.id, error = %e, "Cannot start tool tracking");
            return false;
        }
        self.tracker.start_tracking()
    }

    /// Stop the tracker and the acquisition thread
    pub fn stop_tool_tracking(&self) {
        self.tracker.stop_tracking();
        self.stop_acquisition();
    }

    pub fn is_tracking_tools(&self) -> bool {
        self.tracker.is_tracking()
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.acquisition.stop();
        if let Some(mut sensor) = self
            .idle_sensor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            sensor.release();
        }
        info!(session = %self.id, "Session closed");
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Background depth acquisition loop
//!
//! One worker thread per running stream. Each iteration pulls a frame,
//! drops it if the sensor repeated itself, builds the unit-ray table on the
//! first accepted frame, locates the device, publishes the visualization
//! buffers with the camera pose, and forwards the frame to the tool tracker
//! while tracking is active. The frame is returned to the sensor when the
//! iteration's `SensorFrame` goes out of scope, whichever way it ends. The
//! stream is opened on the caller's thread so that `start` reports a
//! failure to open it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, error, info, warn};

use crate::backends::locator::SpatialLocator;
use crate::backends::sensor::{CameraModel, CaptureLoopController, DepthSensor, LoopAction};
use crate::config::{AcquisitionConfig, ProcessingConfig};
use crate::errors::{TrackingError, TrackingResult};
use crate::pipelines::lut::LutCache;
use crate::pipelines::pose::{PoseResolver, decompose_rigid_transform};
use crate::pipelines::processing::{FrameProcessor, ProcessOutcome, VisualizationParams};
use crate::pipelines::shared_state::{FrameProducts, SharedStateStore};
use crate::tracker::{ToolTracker, TrackerFrame};

const THREAD_NAME: &str = "depth-acquisition";

/// Running counters of the acquisition loop
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    not_located: AtomicU64,
    forwarded: AtomicU64,
}

impl AcquisitionStats {
    /// Frames with a new timestamp
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Frames dropped because the sensor repeated a timestamp
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Accepted frames skipped because the device pose was unknown
    pub fn not_located(&self) -> u64 {
        self.not_located.load(Ordering::Relaxed)
    }

    /// Frames handed to the tool tracker
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

/// Everything the worker shares with the session
#[derive(Clone)]
pub struct AcquisitionContext {
    pub store: Arc<SharedStateStore>,
    pub lut: Arc<LutCache>,
    pub stats: Arc<AcquisitionStats>,
    pub resolver: PoseResolver,
    pub camera: Arc<dyn CameraModel>,
    pub locator: Arc<dyn SpatialLocator>,
    pub tracker: Arc<dyn ToolTracker>,
    pub processing: ProcessingConfig,
    pub acquisition: AcquisitionConfig,
}

/// State owned by the worker thread
struct Worker {
    sensor: Box<dyn DepthSensor>,
    processor: FrameProcessor,
    ctx: AcquisitionContext,
    consecutive_duplicates: u32,
}

impl Worker {
    fn step(&mut self) -> LoopAction {
        match self.try_step() {
            Ok(()) => LoopAction::Continue,
            Err(e) => {
                error!(error = %e, "Acquisition loop fault, shutting down");
                LoopAction::Stop
            }
        }
    }

    fn try_step(&mut self) -> TrackingResult<()> {
        let frame = self.sensor.get_next_buffer()?;
        let ctx = &self.ctx;

        self.processor.set_depth_offset(ctx.store.depth_offset());
        if self.processor.process(&frame) == ProcessOutcome::Duplicate {
            drop(frame);
            ctx.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            self.consecutive_duplicates += 1;
            if ctx
                .acquisition
                .max_consecutive_duplicates
                .is_some_and(|max| self.consecutive_duplicates > max)
            {
                return Err(TrackingError::RuntimeFault(format!(
                    "sensor repeated the same frame {} times",
                    self.consecutive_duplicates
                )));
            }
            thread::sleep(ctx.acquisition.duplicate_backoff());
            return Ok(());
        }
        self.consecutive_duplicates = 0;
        ctx.stats.accepted.fetch_add(1, Ordering::Relaxed);

        ctx.lut.ensure_built(frame.resolution, |uv| {
            ctx.camera.map_image_point_to_unit_plane(uv)
        });

        let reference = ctx.store.reference_frame();
        let Some(camera_to_world) =
            ctx.resolver
                .resolve_world_pose(frame.timestamp, &reference, ctx.locator.as_ref())
        else {
            ctx.stats.not_located.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        ctx.store.publish(FrameProducts {
            resolution: frame.resolution,
            depth: self.processor.depth_buffer(),
            amplitude: self.processor.amplitude_buffer(),
            pose: decompose_rigid_transform(&camera_to_world),
            timestamp: frame.timestamp,
        });

        if ctx.tracker.is_tracking() && ctx.store.advance_tracked_timestamp(frame.timestamp) {
            ctx.tracker.add_frame(&TrackerFrame {
                amplitude: &frame.amplitude,
                depth: &frame.depth,
                width: frame.width(),
                height: frame.height(),
                camera_to_world,
                timestamp: frame.timestamp,
                roi: ctx.store.region_of_interest(),
            });
            ctx.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.sensor.close_stream() {
            warn!(error = %e, "Failed to close depth stream");
        }
        self.sensor.release();
        info!(
            accepted = self.ctx.stats.accepted(),
            duplicates = self.ctx.stats.duplicates(),
            "Depth sensor released"
        );
    }
}

/// Lifecycle of the acquisition thread
#[derive(Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Running(CaptureLoopController),
}

/// Owner of the acquisition thread
#[derive(Default)]
pub struct AcquisitionLoop {
    state: Mutex<AcquisitionState>,
}

impl AcquisitionLoop {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AcquisitionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the worker thread is alive
    pub fn is_running(&self) -> bool {
        matches!(&*self.state(), AcquisitionState::Running(c) if c.is_running())
    }

    /// Spawn the worker unless one is already running
    ///
    /// `open_sensor` is only called when a new worker is needed. Returns
    /// `Ok(false)` when the loop was already running. A worker that exited
    /// on its own (fault or stream end) is reaped and replaced.
    pub fn start<O>(&self, open_sensor: O, ctx: AcquisitionContext) -> TrackingResult<bool>
    where
        O: FnOnce() -> TrackingResult<Box<dyn DepthSensor>>,
    {
        let mut state = self.state();
        if let AcquisitionState::Running(controller) = &mut *state {
            if controller.is_running() {
                debug!("Acquisition already running");
                return Ok(false);
            }
            controller.join();
            *state = AcquisitionState::Idle;
        }

        let mut sensor = open_sensor()?;
        if let Err(e) = sensor.open_stream() {
            sensor.release();
            return Err(TrackingError::ResourceUnavailable(format!(
                "failed to open depth stream: {}",
                e
            )));
        }
        info!(sensor = %sensor.sensor_type(), "Depth stream opened");

        // From here on the worker owns the sensor; dropping it closes the
        // stream and releases the sensor, including when the spawn fails
        let worker = Worker {
            sensor,
            processor: FrameProcessor::new(VisualizationParams::from(&ctx.processing)),
            ctx,
            consecutive_duplicates: 0,
        };
        let controller = CaptureLoopController::start_with_lifecycle(
            THREAD_NAME,
            move || Ok(worker),
            Worker::step,
            drop::<Worker>,
        )
        .map_err(|e| TrackingError::RuntimeFault(format!("failed to spawn worker: {}", e)))?;

        *state = AcquisitionState::Running(controller);
        Ok(true)
    }

    /// Stop the worker and wait for it to release the sensor
    ///
    /// A no-op when idle. The lifecycle lock is held until teardown has
    /// finished, so a concurrent `start` never overlaps the old stream.
    pub fn stop(&self) {
        let mut state = self.state();
        if let AcquisitionState::Running(mut controller) = std::mem::take(&mut *state) {
            controller.stop();
            info!("Acquisition stopped");
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

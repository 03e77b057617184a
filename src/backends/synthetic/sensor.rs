// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic short-throw depth sensor
//!
//! Generates a tilted floor plane in depth and a few bright retro-reflective
//! spots in the active-brightness image, paced at the configured frame
//! interval. Every `duplicate_every`-th pull hands back the previous frame
//! with its old timestamp, the way the real sensor does when polled faster
//! than it produces. A timestamp script can replace the generated clock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

use super::intrinsics::PinholeModel;
use crate::backends::sensor::{
    CameraModel, DepthSensor, Resolution, SensorError, SensorFrame, SensorResult, SensorType,
};
use crate::config::SyntheticConfig;
use crate::constants::{ahat, duration_to_ticks};

/// First generated timestamp (100ns ticks)
const START_TIMESTAMP: u64 = 1_000_000;

/// Lifetime counters shared by every sensor a device opens
#[derive(Debug, Default)]
pub struct SensorCounters {
    streams_opened: AtomicU64,
    streams_closed: AtomicU64,
    frames_delivered: AtomicU64,
    frames_released: AtomicU64,
    sensors_released: AtomicU64,
    open_streams: AtomicU64,
    max_open_streams: AtomicU64,
}

impl SensorCounters {
    pub fn streams_opened(&self) -> u64 {
        self.streams_opened.load(Ordering::SeqCst)
    }

    pub fn streams_closed(&self) -> u64 {
        self.streams_closed.load(Ordering::SeqCst)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    pub fn frames_released(&self) -> u64 {
        self.frames_released.load(Ordering::SeqCst)
    }

    pub fn sensors_released(&self) -> u64 {
        self.sensors_released.load(Ordering::SeqCst)
    }

    /// Most streams that were open at the same time
    pub fn max_open_streams(&self) -> u64 {
        self.max_open_streams.load(Ordering::SeqCst)
    }
}

/// Timestamp source of a synthetic stream
#[derive(Debug)]
enum Clock {
    Generated { next: u64, step: u64 },
    Scripted(VecDeque<u64>),
}

pub struct SyntheticSensor {
    resolution: Resolution,
    frame_interval: Duration,
    duplicate_every: u32,
    clock: Clock,
    camera: Arc<PinholeModel>,
    counters: Arc<SensorCounters>,
    streaming: bool,
    released: bool,
    fail_open: bool,
    pulls: u64,
    last: Option<(Vec<u16>, Vec<u16>, u64)>,
}

impl SyntheticSensor {
    pub(super) fn new(
        config: &SyntheticConfig,
        camera: Arc<PinholeModel>,
        counters: Arc<SensorCounters>,
        script: Option<Vec<u64>>,
    ) -> Self {
        let frame_interval = Duration::from_millis(config.frame_interval_ms);
        let clock = match script {
            Some(timestamps) => Clock::Scripted(timestamps.into()),
            None => Clock::Generated {
                next: START_TIMESTAMP,
                step: duration_to_ticks(frame_interval).max(1),
            },
        };
        Self {
            resolution: Resolution::new(config.width, config.height, ahat::BYTES_PER_PIXEL),
            frame_interval,
            duplicate_every: config.duplicate_every,
            clock,
            camera,
            counters,
            streaming: false,
            released: false,
            fail_open: false,
            pulls: 0,
            last: None,
        }
    }

    /// Make every `open_stream` call fail
    pub(super) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn next_timestamp(&mut self) -> Option<u64> {
        match &mut self.clock {
            Clock::Generated { next, step } => {
                let ts = *next;
                *next += *step;
                Some(ts)
            }
            Clock::Scripted(script) => script.pop_front(),
        }
    }

    fn render(&self, timestamp: u64) -> (Vec<u16>, Vec<u16>) {
        let (w, h) = (self.resolution.width, self.resolution.height);
        let mut depth = Vec::with_capacity(self.resolution.pixel_count());
        let mut amplitude = Vec::with_capacity(self.resolution.pixel_count());

        // Markers drift slowly across the image
        let phase = (timestamp / 100_000) as f32 * 0.05;
        let markers: Vec<(f32, f32)> = (0..4)
            .map(|i| {
                let angle = phase + i as f32 * std::f32::consts::FRAC_PI_2;
                (
                    w as f32 / 2.0 + angle.cos() * w as f32 / 8.0,
                    h as f32 / 2.0 + angle.sin() * h as f32 / 8.0,
                )
            })
            .collect();
        let marker_radius = (w.min(h) as f32 / 100.0).max(1.0);

        for y in 0..h {
            for x in 0..w {
                // Floor rising toward the bottom of the image, 300..1100 mm
                let d = 300 + (y as u64 * 800 / h.max(1) as u64) as u16;
                let center = [x as f32 + 0.5, y as f32 + 0.5];
                // Outside the image circle the sensor reports invalid depth
                let inside = self.camera.map_image_point_to_unit_plane(center).is_ok();
                depth.push(if inside { d } else { 4095 });

                let lit = markers.iter().any(|&(mx, my)| {
                    let (dx, dy) = (x as f32 - mx, y as f32 - my);
                    dx * dx + dy * dy <= marker_radius * marker_radius
                });
                amplitude.push(if lit { 2000 } else { 150 + (x % 64) as u16 });
            }
        }

        (depth, amplitude)
    }

    fn deliver(
        &self,
        depth: Vec<u16>,
        amplitude: Vec<u16>,
        timestamp: u64,
    ) -> SensorResult<SensorFrame> {
        let counters = Arc::clone(&self.counters);
        let frame = SensorFrame::new(self.resolution, depth, amplitude, timestamp)?
            .with_release_hook(Box::new(move || {
                counters.frames_released.fetch_add(1, Ordering::SeqCst);
            }));
        self.counters.frames_delivered.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }
}

impl DepthSensor for SyntheticSensor {
    fn sensor_type(&self) -> SensorType {
        SensorType::DepthAhat
    }

    fn camera_model(&self) -> Arc<dyn CameraModel> {
        self.camera.clone()
    }

    fn open_stream(&mut self) -> SensorResult<()> {
        if self.released {
            return Err(SensorError::OpenFailed("sensor was released".to_string()));
        }
        if self.fail_open {
            return Err(SensorError::OpenFailed("stream refused".to_string()));
        }
        self.streaming = true;
        self.counters.streams_opened.fetch_add(1, Ordering::SeqCst);
        let open = self.counters.open_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open_streams.fetch_max(open, Ordering::SeqCst);
        debug!(resolution = %self.resolution, "Synthetic stream opened");
        Ok(())
    }

    fn get_next_buffer(&mut self) -> SensorResult<SensorFrame> {
        if !self.streaming {
            return Err(SensorError::StreamClosed);
        }
        self.pulls += 1;

        if self.duplicate_every > 0 && self.pulls % self.duplicate_every as u64 == 0 {
            if let Some((depth, amplitude, ts)) = self.last.clone() {
                return self.deliver(depth, amplitude, ts);
            }
        }

        let Some(timestamp) = self.next_timestamp() else {
            debug!("Timestamp script exhausted");
            return Err(SensorError::StreamClosed);
        };
        if !self.frame_interval.is_zero() {
            thread::sleep(self.frame_interval);
        }

        let (depth, amplitude) = self.render(timestamp);
        self.last = Some((depth.clone(), amplitude.clone(), timestamp));
        self.deliver(depth, amplitude, timestamp)
    }

    fn close_stream(&mut self) -> SensorResult<()> {
        if !self.streaming {
            return Err(SensorError::StreamClosed);
        }
        self.streaming = false;
        self.counters.streams_closed.fetch_add(1, Ordering::SeqCst);
        self.counters.open_streams.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            if self.streaming {
                self.counters.open_streams.fetch_sub(1, Ordering::SeqCst);
            }
            self.released = true;
            self.streaming = false;
            self.counters.sensors_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(duplicate_every: u32) -> SyntheticConfig {
        SyntheticConfig {
            width: 16,
            height: 16,
            frame_interval_ms: 0,
            duplicate_every,
        }
    }

    fn sensor(
        duplicate_every: u32,
        script: Option<Vec<u64>>,
    ) -> (SyntheticSensor, Arc<SensorCounters>) {
        let counters = Arc::new(SensorCounters::default());
        let camera = Arc::new(PinholeModel::for_resolution(16, 16));
        let config = config(duplicate_every);
        let sensor = SyntheticSensor::new(&config, camera, Arc::clone(&counters), script);
        (sensor, counters)
    }

    #[test]
    fn test_closed_stream_errors() {
        let (mut sensor, _) = sensor(0, None);
        assert!(matches!(sensor.get_next_buffer(), Err(SensorError::StreamClosed)));
    }

    #[test]
    fn test_duplicate_cadence() {
        let (mut sensor, counters) = sensor(3, None);
        sensor.open_stream().unwrap();

        let timestamps: Vec<u64> = (0..6)
            .map(|_| sensor.get_next_buffer().unwrap().timestamp)
            .collect();

        assert_eq!(timestamps[1], timestamps[2]);
        assert_eq!(timestamps[4], timestamps[5]);
        assert!(timestamps[0] < timestamps[1]);
        assert_eq!(counters.frames_delivered(), 6);
        assert_eq!(counters.frames_released(), 6);
    }

    #[test]
    fn test_script_exhaustion_closes_stream() {
        let (mut sensor, _) = sensor(0, Some(vec![5, 9]));
        sensor.open_stream().unwrap();
        assert_eq!(sensor.get_next_buffer().unwrap().timestamp, 5);
        assert_eq!(sensor.get_next_buffer().unwrap().timestamp, 9);
        assert!(matches!(sensor.get_next_buffer(), Err(SensorError::StreamClosed)));
    }

    #[test]
    fn test_frame_contents() {
        let (mut sensor, _) = sensor(0, None);
        sensor.open_stream().unwrap();
        let frame = sensor.get_next_buffer().unwrap();

        assert_eq!(frame.depth.len(), 256);
        assert_eq!(frame.amplitude.len(), 256);
        // Corner pixel lies outside the image circle
        assert_eq!(frame.depth[0], 4095);
        assert!(frame.amplitude.iter().any(|&a| a > 1000));
    }

    #[test]
    fn test_released_sensor_cannot_reopen() {
        let (mut sensor, counters) = sensor(0, None);
        sensor.release();
        sensor.release();
        assert!(sensor.open_stream().is_err());
        assert_eq!(counters.sensors_released(), 1);
    }

    #[test]
    fn test_failing_open() {
        let (sensor, counters) = sensor(0, None);
        let mut sensor = sensor.failing_open();
        assert!(matches!(sensor.open_stream(), Err(SensorError::OpenFailed(_))));
        assert_eq!(counters.streams_opened(), 0);
    }

    #[test]
    fn test_open_stream_gauge() {
        let (mut first, counters) = sensor(0, None);
        let camera = Arc::new(PinholeModel::for_resolution(16, 16));
        let mut second = SyntheticSensor::new(&config(0), camera, Arc::clone(&counters), None);

        first.open_stream().unwrap();
        first.close_stream().unwrap();
        second.open_stream().unwrap();
        assert_eq!(counters.max_open_streams(), 1);

        first.open_stream().unwrap();
        assert_eq!(counters.max_open_streams(), 2);
        first.release();
        second.close_stream().unwrap();
        second.release();
        assert_eq!(counters.streams_closed(), 2);
    }
}

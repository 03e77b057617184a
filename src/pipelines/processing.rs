// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame depth and amplitude processing
//!
//! Turns the raw 16-bit depth and active-brightness buffers of a sensor
//! frame into 8-bit grayscale buffers for display, after filtering out
//! frames the sensor has already delivered.
//!
//! Depth mapping:
//! - raw above the far clip → 0 (out of range)
//! - `raw - offset` (saturating) below the near clip or zero → 0
//! - otherwise scaled by `255 / range` and truncated; values past the
//!   range saturate at 255
//!
//! Amplitude mapping:
//! - raw above the saturation threshold → 255
//! - otherwise scaled by `255 / saturation` and truncated

use crate::backends::sensor::SensorFrame;
use crate::config::ProcessingConfig;

/// Parameters of the visualization mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualizationParams {
    /// Subtracted from every depth value before scaling (mm)
    pub depth_offset: u16,
    /// Depth below this after the offset is rendered black (mm)
    pub near_clip: u16,
    /// Raw depth above this is invalid (mm)
    pub far_clip: u16,
    /// Amplitude above this saturates
    pub amplitude_saturation: u16,
    /// Depth window mapped onto the full byte range (mm)
    pub range_mm: u16,
}

impl Default for VisualizationParams {
    fn default() -> Self {
        Self::from(&ProcessingConfig::default())
    }
}

impl From<&ProcessingConfig> for VisualizationParams {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            depth_offset: config.depth_offset,
            near_clip: config.near_clip,
            far_clip: config.far_clip,
            amplitude_saturation: config.amplitude_saturation,
            range_mm: config.visualization_range_mm.max(1),
        }
    }
}

/// Map one raw depth value to a display byte
#[inline]
pub fn depth_to_gray(raw: u16, params: &VisualizationParams) -> u8 {
    if raw > params.far_clip {
        return 0;
    }
    let depth = raw.saturating_sub(params.depth_offset);
    if depth == 0 || depth < params.near_clip {
        return 0;
    }
    // `as u8` saturates, so depth past the window clamps to 255
    (depth as f32 / params.range_mm as f32 * 255.0) as u8
}

/// Map one raw amplitude value to a display byte
#[inline]
pub fn amplitude_to_gray(raw: u16, params: &VisualizationParams) -> u8 {
    if raw > params.amplitude_saturation {
        return u8::MAX;
    }
    (raw as f32 / params.amplitude_saturation.max(1) as f32 * 255.0) as u8
}

/// Convert a whole depth buffer into `out`, resizing it to match
pub fn depth_to_grayscale(depth: &[u16], params: &VisualizationParams, out: &mut Vec<u8>) {
    out.resize(depth.len(), 0);
    for (dst, &raw) in out.iter_mut().zip(depth) {
        *dst = depth_to_gray(raw, params);
    }
}

/// Convert a whole amplitude buffer into `out`, resizing it to match
pub fn amplitude_to_grayscale(amplitude: &[u16], params: &VisualizationParams, out: &mut Vec<u8>) {
    out.resize(amplitude.len(), 0);
    for (dst, &raw) in out.iter_mut().zip(amplitude) {
        *dst = amplitude_to_gray(raw, params);
    }
}

/// Result of feeding a frame to the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Same (or older) timestamp as the last accepted frame; back off and retry
    Duplicate,
    /// New frame; visualization buffers were regenerated
    Processed,
}

/// Stateful frame processor
///
/// Remembers the last accepted timestamp and owns the two visualization
/// buffers, which are reused across frames of the same size.
#[derive(Debug, Default)]
pub struct FrameProcessor {
    params: VisualizationParams,
    last_timestamp: Option<u64>,
    depth: Vec<u8>,
    amplitude: Vec<u8>,
}

impl FrameProcessor {
    pub fn new(params: VisualizationParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn params(&self) -> &VisualizationParams {
        &self.params
    }

    pub fn set_depth_offset(&mut self, offset: u16) {
        self.params.depth_offset = offset;
    }

    /// Timestamp of the last accepted frame
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Deduplicate and convert one frame
    pub fn process(&mut self, frame: &SensorFrame) -> ProcessOutcome {
        if self
            .last_timestamp
            .is_some_and(|last| frame.timestamp <= last)
        {
            return ProcessOutcome::Duplicate;
        }
        self.last_timestamp = Some(frame.timestamp);

        depth_to_grayscale(&frame.depth, &self.params, &mut self.depth);
        amplitude_to_grayscale(&frame.amplitude, &self.params, &mut self.amplitude);
        ProcessOutcome::Processed
    }

    /// Depth visualization of the last accepted frame
    pub fn depth_buffer(&self) -> &[u8] {
        &self.depth
    }

    /// Amplitude visualization of the last accepted frame
    pub fn amplitude_buffer(&self) -> &[u8] {
        &self.amplitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::sensor::Resolution;

    fn frame(depth: Vec<u16>, amplitude: Vec<u16>, timestamp: u64) -> SensorFrame {
        let res = Resolution::new(depth.len() as u32, 1, 2);
        SensorFrame::new(res, depth, amplitude, timestamp).unwrap()
    }

    #[test]
    fn test_depth_mapping() {
        let params = VisualizationParams::default();
        assert_eq!(depth_to_gray(4095, &params), 0);
        assert_eq!(depth_to_gray(0, &params), 0);
        assert_eq!(depth_to_gray(1000, &params), 255);
        assert_eq!(depth_to_gray(500, &params), 127);
        // Past the visualization window but inside the valid range
        assert_eq!(depth_to_gray(3000, &params), 255);
        assert_eq!(depth_to_gray(4090, &params), 255);
        assert_eq!(depth_to_gray(4091, &params), 0);
    }

    #[test]
    fn test_depth_offset_saturates() {
        let params = VisualizationParams {
            depth_offset: 200,
            ..Default::default()
        };
        assert_eq!(depth_to_gray(100, &params), 0);
        assert_eq!(depth_to_gray(200, &params), 0);
        assert_eq!(depth_to_gray(1200, &params), 255);
    }

    #[test]
    fn test_near_clip() {
        let params = VisualizationParams {
            near_clip: 200,
            ..Default::default()
        };
        assert_eq!(depth_to_gray(199, &params), 0);
        assert!(depth_to_gray(200, &params) > 0);
    }

    #[test]
    fn test_amplitude_mapping() {
        let params = VisualizationParams::default();
        assert_eq!(amplitude_to_gray(1500, &params), 255);
        assert_eq!(amplitude_to_gray(1000, &params), 255);
        assert!(amplitude_to_gray(500, &params).abs_diff(128) <= 1);
        assert_eq!(amplitude_to_gray(0, &params), 0);
    }

    #[test]
    fn test_duplicates_are_skipped() {
        let mut processor = FrameProcessor::default();
        let input = [10u64, 10, 20, 20, 20, 30, 40, 40];
        let mut accepted = Vec::new();

        for ts in input {
            if processor.process(&frame(vec![1000, 0], vec![1500, 500], ts))
                == ProcessOutcome::Processed
            {
                accepted.push(ts);
            }
        }

        assert_eq!(accepted, vec![10, 20, 30, 40]);
        assert_eq!(processor.last_timestamp(), Some(40));
    }

    #[test]
    fn test_buffers_follow_frame_size() {
        let mut processor = FrameProcessor::default();
        processor.process(&frame(vec![1000, 4095, 0], vec![1500, 0, 1000], 1));
        assert_eq!(processor.depth_buffer(), &[255, 0, 0]);
        assert_eq!(processor.amplitude_buffer(), &[255, 0, 255]);

        processor.process(&frame(vec![1000], vec![0], 2));
        assert_eq!(processor.depth_buffer().len(), 1);
        assert_eq!(processor.amplitude_buffer().len(), 1);
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Per-pixel unit-ray lookup table
//!
//! Unprojecting through the sensor's lens model is expensive, so the ray
//! for every pixel center is computed once on the first accepted frame and
//! reused for the lifetime of the session. Rays are indexed exactly like
//! the depth buffer (`y * width + x`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::backends::sensor::{Resolution, UnprojectError};

/// Camera-space unit direction for every pixel of one resolution
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRayLut {
    resolution: Resolution,
    rays: Vec<[f32; 3]>,
}

impl UnitRayLut {
    /// Build the table by unprojecting every pixel center
    ///
    /// Successfully mapped points `(x, y)` become `(x, y, 1)` normalized to
    /// unit length. Where mapping fails the raw `(x, y)` reported by the
    /// model is kept with `z = 0`, a degraded entry rather than an error.
    pub fn build<F>(resolution: Resolution, mut unproject: F) -> Self
    where
        F: FnMut([f32; 2]) -> Result<[f32; 2], UnprojectError>,
    {
        let mut rays = Vec::with_capacity(resolution.pixel_count());
        let mut failed = 0usize;

        for y in 0..resolution.height {
            let v = y as f32 + 0.5;
            for x in 0..resolution.width {
                let u = x as f32 + 0.5;
                match unproject([u, v]) {
                    Ok([px, py]) => {
                        let inv_norm = 1.0 / (px * px + py * py + 1.0).sqrt();
                        rays.push([px * inv_norm, py * inv_norm, inv_norm]);
                    }
                    Err(UnprojectError { xy }) => {
                        failed += 1;
                        rays.push([xy[0], xy[1], 0.0]);
                    }
                }
            }
        }

        if failed > 0 {
            debug!(failed, total = rays.len(), "Pixels outside the lens model");
        }

        Self { resolution, rays }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn rays(&self) -> &[[f32; 3]] {
        &self.rays
    }

    /// Ray for pixel `(x, y)`
    pub fn ray(&self, x: u32, y: u32) -> Option<[f32; 3]> {
        if x >= self.resolution.width || y >= self.resolution.height {
            return None;
        }
        self.rays
            .get(y as usize * self.resolution.width as usize + x as usize)
            .copied()
    }

    /// Rays as a flat `x, y, z, x, y, z, ...` slice
    pub fn as_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.rays)
    }

    /// Number of floats in the flat representation (`width * height * 3`)
    pub fn flat_len(&self) -> usize {
        self.rays.len() * 3
    }
}

/// Lazily built, immutable-after-creation LUT holder
///
/// Only the acquisition thread builds; any thread may read. The
/// `generated` flag is published with release ordering after the table is
/// stored so readers that observe it also observe the table.
#[derive(Debug, Default)]
pub struct LutCache {
    generated: AtomicBool,
    table: RwLock<Option<Arc<UnitRayLut>>>,
}

impl LutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table for `resolution` unless it already exists
    ///
    /// Returns `true` when this call performed the build.
    pub fn ensure_built<F>(&self, resolution: Resolution, unproject: F) -> bool
    where
        F: FnMut([f32; 2]) -> Result<[f32; 2], UnprojectError>,
    {
        if self.generated.load(Ordering::Acquire)
            && self.get().is_some_and(|lut| lut.resolution() == resolution)
        {
            return false;
        }

        info!(
            width = resolution.width,
            height = resolution.height,
            "Building unit-ray lookup table"
        );
        let lut = Arc::new(UnitRayLut::build(resolution, unproject));

        *self
            .table
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(lut);
        self.generated.store(true, Ordering::Release);
        true
    }

    /// Whether a table has been built
    pub fn is_ready(&self) -> bool {
        self.generated.load(Ordering::Acquire)
    }

    /// Shared handle to the current table
    pub fn get(&self) -> Option<Arc<UnitRayLut>> {
        self.table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Copy of the table as flat floats
    pub fn snapshot(&self) -> Option<Vec<f32>> {
        self.get().map(|lut| lut.as_flat().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinhole(uv: [f32; 2]) -> Result<[f32; 2], UnprojectError> {
        // 4x4 image, principal point in the middle, focal length 2
        Ok([(uv[0] - 2.0) / 2.0, (uv[1] - 2.0) / 2.0])
    }

    #[test]
    fn test_build_is_idempotent() {
        let cache = LutCache::new();
        let res = Resolution::new(4, 4, 2);
        let mut calls = 0;

        let mut builds = 0;
        for _ in 0..5 {
            if cache.ensure_built(res, |uv| {
                calls += 1;
                pinhole(uv)
            }) {
                builds += 1;
            }
        }

        assert_eq!(builds, 1);
        assert_eq!(calls, 16);
        assert!(cache.is_ready());
        assert_eq!(cache.snapshot().map(|v| v.len()), Some(4 * 4 * 3));
    }

    #[test]
    fn test_new_resolution_rebuilds() {
        let cache = LutCache::new();
        assert!(cache.ensure_built(Resolution::new(4, 4, 2), pinhole));
        assert!(cache.ensure_built(Resolution::new(2, 2, 2), pinhole));
        assert_eq!(cache.get().map(|l| l.rays().len()), Some(4));
    }

    #[test]
    fn test_rays_are_unit_length() {
        let lut = UnitRayLut::build(Resolution::new(4, 4, 2), pinhole);
        for ray in lut.rays() {
            let norm = (ray[0] * ray[0] + ray[1] * ray[1] + ray[2] * ray[2]).sqrt();
            assert!((norm - 1.0).abs() < 1e-6);
        }
        // Pixel (1, 1) has center (1.5, 1.5) → unit plane (-0.25, -0.25)
        let ray = lut.ray(1, 1).unwrap();
        assert!(ray[0] < 0.0 && ray[1] < 0.0 && ray[2] > 0.9);
        assert!(lut.ray(4, 0).is_none());
    }

    #[test]
    fn test_failed_pixels_keep_raw_coordinates() {
        let lut = UnitRayLut::build(Resolution::new(2, 1, 2), |uv| {
            if uv[0] > 1.0 {
                Err(UnprojectError { xy: [3.0, -4.0] })
            } else {
                Ok([0.0, 0.0])
            }
        });

        assert_eq!(lut.rays()[0], [0.0, 0.0, 1.0]);
        assert_eq!(lut.rays()[1], [3.0, -4.0, 0.0]);
        assert_eq!(lut.flat_len(), 6);
        assert_eq!(lut.as_flat(), &[0.0, 0.0, 1.0, 3.0, -4.0, 0.0]);
    }
}

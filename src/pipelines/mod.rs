// SPDX-License-Identifier: GPL-3.0-only

//! Depth processing pipeline
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ Sensor Frame │ ──▶ │  FrameProcessor   │ ──▶ │ SharedStateStore │ ──▶ readers
//! │ (u16 depth,  │     │  - dedup by ts    │     │  - 8-bit buffers │
//! │  u16 AB)     │     │  - 8-bit mapping  │     │  - pose, ts      │
//! └──────────────┘     └───────────────────┘     └──────────────────┘
//!        │                                                ▲
//!        │             ┌───────────────────┐              │
//!        ├───────────▶ │     LutCache      │  (first frame only)
//!        │             └───────────────────┘              │
//!        │             ┌───────────────────┐              │
//!        └───────────▶ │   PoseResolver    │ ─────────────┘
//!                      │ extrinsics ∘ loc. │ ──▶ ToolTracker (while tracking)
//!                      └───────────────────┘
//! ```
//!
//! Everything left of the store runs on the acquisition thread.

pub mod acquisition;
pub mod lut;
pub mod pose;
pub mod processing;
pub mod shared_state;

pub use acquisition::{AcquisitionContext, AcquisitionLoop, AcquisitionState, AcquisitionStats};
pub use lut::{LutCache, UnitRayLut};
pub use pose::{Pose, PoseResolver, decompose_rigid_transform, format_matrix};
pub use processing::{FrameProcessor, ProcessOutcome, VisualizationParams};
pub use shared_state::{FrameProducts, SharedStateStore};

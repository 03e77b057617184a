// SPDX-License-Identifier: GPL-3.0-only

//! IR Tool Tracking - depth acquisition and pose registration
//!
//! This library runs the acquisition side of an infrared tool tracker on a
//! head-mounted depth camera: it waits for sensor consent, pulls
//! short-throw depth and active-brightness frames on a background thread,
//! turns them into 8-bit visualization buffers, registers every frame in
//! world space through the device locator, and feeds the frames to an
//! infrared marker tracker.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Sensor provider, consent and locator abstractions (plus a synthetic device)
//! - [`pipelines`]: Frame processing, lookup table, pose resolution and the acquisition loop
//! - [`tracker`]: Infrared tool tracker seam and tool definitions
//! - [`session`]: Host-facing session that ties everything together
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let session = TrackingSession::new(device, &consent, locator, tracker, Config::default())?;
//! session.start_acquisition()?;
//! let depth = session.depth_texture_buffer();
//! let pose = session.depth_to_world_pose();
//! session.stop_acquisition();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod session;
pub mod tracker;

// Re-export commonly used types
pub use backends::consent::{Capability, ConsentStatus};
pub use backends::locator::ReferenceFrame;
pub use config::Config;
pub use errors::{TrackingError, TrackingResult};
pub use pipelines::Pose;
pub use session::TrackingSession;
pub use tracker::{ToolDefinition, ToolTracker};

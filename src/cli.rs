// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Showing the depth sensor calibration
//! - Running acquisition (optionally with tool tracking) on the synthetic device
//! - Building the unit-ray lookup table
//! - Writing a config file with the current defaults

use chrono::Local;
use ir_tool_tracking::backends::synthetic::{ImmediateConsent, ScriptedLocator, SyntheticDevice};
use ir_tool_tracking::tracker::ToolRegistry;
use ir_tool_tracking::{Config, TrackingSession};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Demo tool: four spheres on a 5 cm square with one corner raised (meters)
const DEMO_TOOL_ID: &str = "demo-pointer";
const DEMO_TOOL_SPHERES: [f32; 12] = [
    0.0, 0.0, 0.0, //
    0.05, 0.0, 0.0, //
    0.05, 0.05, 0.0, //
    0.0, 0.05, 0.015,
];
const DEMO_SPHERE_RADIUS: f32 = 0.0065;

fn load_config(path: Option<&Path>) -> Config {
    path.map(Config::load_or_default).unwrap_or_default()
}

fn open_session(
    config: Config,
    registry: Arc<ToolRegistry>,
) -> Result<TrackingSession, Box<dyn std::error::Error>> {
    let device = Arc::new(SyntheticDevice::new(config.synthetic));
    let session = TrackingSession::new(
        device,
        &ImmediateConsent::allow_all(),
        Arc::new(ScriptedLocator::orbit()),
        registry,
        config,
    )?;
    Ok(session)
}

fn format_pose(pose: &[f32; 7]) -> String {
    format!(
        "t=({:+.3}, {:+.3}, {:+.3}) q=({:+.3}, {:+.3}, {:+.3}, {:+.3})",
        pose[0], pose[1], pose[2], pose[3], pose[4], pose[5], pose[6]
    )
}

/// Print the depth sensor calibration
pub fn show_info(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path);
    let session = open_session(config, Arc::new(ToolRegistry::new()))?;

    println!("Session: {}", session.id());
    println!(
        "Configured resolution: {}x{}",
        session.config().synthetic.width,
        session.config().synthetic.height
    );
    println!();
    println!("Depth extrinsics:");
    print!("{}", session.print_depth_extrinsics());
    println!();
    println!("Encoded: {}", format_pose(&session.encoded_extrinsics()));

    Ok(())
}

/// Run acquisition until the duration elapses or Ctrl+C
pub fn run(
    config_path: Option<&Path>,
    duration: u64,
    track: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path);
    let registry = Arc::new(ToolRegistry::new());
    let session = open_session(config, Arc::clone(&registry))?;

    if track {
        if !session.add_tool_definition(4, &DEMO_TOOL_SPHERES, DEMO_SPHERE_RADIUS, DEMO_TOOL_ID) {
            return Err("Demo tool definition rejected".into());
        }
        if !session.start_tool_tracking() {
            return Err("Failed to start tool tracking".into());
        }
    } else {
        session.start_acquisition()?;
    }

    println!(
        "Acquiring since {}... (press Ctrl+C to stop early)",
        Local::now().format("%H:%M:%S")
    );

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    // Wait for duration or Ctrl+C
    let start = Instant::now();
    let target_duration = Duration::from_secs(duration);
    let mut last_report = Instant::now();

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if !session.is_acquiring() {
            println!();
            println!("Acquisition ended unexpectedly");
            break;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let stats = session.stats();
            println!(
                "[{}] ts={} frames={} dup={} lost={} pose {}",
                Local::now().format("%H:%M:%S"),
                session.last_depth_timestamp(),
                stats.accepted(),
                stats.duplicates(),
                stats.not_located(),
                format_pose(&session.depth_to_world_pose())
            );
            if track {
                println!(
                    "           tracked ts={} forwarded={}",
                    session.last_tracked_timestamp(),
                    registry.frames_received()
                );
            }
        }

        std::thread::sleep(Duration::from_millis(100));
    }

    if track {
        session.stop_tool_tracking();
    } else {
        session.stop_acquisition();
    }

    println!();
    println!("Resolution: {}", session.print_depth_resolution());
    println!("Frames accepted: {}", session.stats().accepted());
    println!("LUT ready: {}", session.is_lut_ready());

    Ok(())
}

/// Acquire until the lookup table exists, then print a summary of it
pub fn build_lut(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path);
    let session = open_session(config, Arc::new(ToolRegistry::new()))?;

    let start = Instant::now();
    session.start_acquisition()?;
    while !session.is_lut_ready() {
        if !session.is_acquiring() {
            return Err("Acquisition stopped before the lookup table was built".into());
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    session.stop_acquisition();

    let lut = session.lut().ok_or("Lookup table missing")?;
    let resolution = lut.resolution();
    let degraded = lut.rays().iter().filter(|r| r[2] == 0.0).count();

    println!("Built in {:.1?}", start.elapsed());
    println!("Resolution: {}x{}", resolution.width, resolution.height);
    println!("Entries: {} ({} floats)", lut.rays().len(), lut.flat_len());
    println!("Outside lens model: {}", degraded);

    let (cx, cy) = (resolution.width / 2, resolution.height / 2);
    if let Some(center) = lut.ray(cx, cy) {
        println!(
            "Center ray ({}, {}): ({:.4}, {:.4}, {:.4})",
            cx, cy, center[0], center[1], center[2]
        );
    }

    Ok(())
}

/// Write the effective config to `config_path`
pub fn init_config(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.ok_or("No config directory available, pass --config")?;
    let config = load_config(Some(path));
    config.save(path)?;
    println!("Config written: {}", path.display());
    Ok(())
}

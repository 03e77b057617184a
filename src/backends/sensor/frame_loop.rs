// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management for capture loops
//!
//! A capture loop owns one dedicated thread. The thread runs an optional
//! initialization step, then calls the loop body until either the body asks
//! to stop or the controller's stop signal is raised, and finally runs a
//! teardown step. Teardown runs on every exit path, including a panic in the
//! loop body, so hardware streams are always closed.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a capture loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let mut controller = CaptureLoopController::start_with_lifecycle(
///     "depth-capture",
///     move || sensor.open_stream().map(|_| sensor).map_err(|e| e.to_string()),
///     |sensor| match sensor.get_next_buffer() {
///         Ok(frame) => {
///             process(frame);
///             LoopAction::Continue
///         }
///         Err(_) => LoopAction::Stop,
///     },
///     |mut sensor| sensor.release(),
/// )?;
///
/// // Later, stop the loop and wait for teardown
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl CaptureLoopController {
    /// Start a capture loop with initialization and teardown
    ///
    /// * `init_fn` - Runs once on the new thread. If it fails, the thread
    ///   exits immediately and neither the loop nor the teardown run.
    /// * `loop_fn` - One iteration of the loop, receives the state
    /// * `teardown_fn` - Receives the state back after the loop exits, on
    ///   every exit path (stop signal, `LoopAction::Stop`, or panic)
    pub fn start_with_lifecycle<S, I, F, T>(
        name: &str,
        init_fn: I,
        mut loop_fn: F,
        teardown_fn: T,
    ) -> std::io::Result<Self>
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        T: FnOnce(S) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Capture loop thread started, initializing...");

                let mut state = match init_fn() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Initialization failed");
                        return;
                    }
                };

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match loop_fn(&mut state) {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }
                }));

                if let Err(payload) = outcome {
                    error!(
                        name = %name_clone,
                        panic = %panic_message(payload.as_ref()),
                        "Capture loop panicked, shutting down"
                    );
                }

                teardown_fn(state);
                info!(name = %name_clone, "Capture loop thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    ///
    /// Takes effect at the next iteration boundary.
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Capture loop thread finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Loop without state, init or teardown
    fn start_loop<F>(name: &str, mut loop_fn: F) -> std::io::Result<CaptureLoopController>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        CaptureLoopController::start_with_lifecycle(
            name,
            || Ok(()),
            move |_: &mut ()| loop_fn(),
            |_| {},
        )
    }

    #[test]
    fn test_basic_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = start_loop("test-loop", move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .unwrap();

        controller.join();

        assert_eq!(counter.load(Ordering::SeqCst), 11); // 0-10 inclusive
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = start_loop("test-loop", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(50));

        controller.stop();
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_teardown_receives_state() {
        let torn_down = Arc::new(AtomicU32::new(0));
        let torn_down_clone = Arc::clone(&torn_down);

        let mut controller = CaptureLoopController::start_with_lifecycle(
            "test-lifecycle",
            || Ok(42u32),
            |_state| LoopAction::Stop,
            move |state| torn_down_clone.store(state, Ordering::SeqCst),
        )
        .unwrap();

        controller.join();
        assert_eq!(torn_down.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_init_failure_skips_loop_and_teardown() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_loop = Arc::clone(&ran);
        let ran_teardown = Arc::clone(&ran);

        let mut controller = CaptureLoopController::start_with_lifecycle(
            "test-fail-init",
            || Err::<(), _>("Init failed".to_string()),
            move |_| {
                ran_loop.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
            move |_| ran_teardown.store(true, Ordering::SeqCst),
        )
        .unwrap();

        controller.join();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_teardown_runs_after_panic() {
        let torn_down = Arc::new(AtomicBool::new(false));
        let torn_down_clone = Arc::clone(&torn_down);

        let mut controller = CaptureLoopController::start_with_lifecycle(
            "test-panic",
            || Ok(()),
            |_| panic!("sensor exploded"),
            move |_| torn_down_clone.store(true, Ordering::SeqCst),
        )
        .unwrap();

        controller.join();
        assert!(torn_down.load(Ordering::SeqCst));
    }

    #[test]
    fn test_is_running() {
        let controller = start_loop("test-running", || {
            thread::sleep(Duration::from_millis(100));
            LoopAction::Continue
        })
        .unwrap();

        assert!(controller.is_running());

        // Drop will stop it
        drop(controller);
    }
}

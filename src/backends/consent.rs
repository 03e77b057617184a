// SPDX-License-Identifier: GPL-3.0-only

//! User consent gate for sensor capabilities
//!
//! The platform asks the user (or system policy) for permission
//! asynchronously and reports back through a completion callback. Each
//! capability gets a one-shot channel: the callback sends the decision, and
//! [`ConsentGate::await_consent`] blocks on the receiving end. The decision
//! is recorded, so later awaits return immediately with the same result.

use futures::channel::oneshot;
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info, warn};

use crate::errors::{TrackingError, TrackingResult};

/// Capability a sensor session needs consent for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Camera sensors (depth, visible light)
    Camera,
    /// Motion sensors (accelerometer, gyroscope, magnetometer)
    Imu,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Camera => write!(f, "camera"),
            Capability::Imu => write!(f, "motion sensor"),
        }
    }
}

/// Decision reported by the consent service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentStatus {
    Allowed,
    DeniedBySystem,
    DeniedByUser,
    /// Capability is not declared in the application manifest
    CapabilityNotDeclared,
    UserPromptRequired,
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentStatus::Allowed => write!(f, "access is granted"),
            ConsentStatus::DeniedBySystem => write!(f, "access is denied by the system"),
            ConsentStatus::DeniedByUser => write!(f, "access is denied by the user"),
            ConsentStatus::CapabilityNotDeclared => {
                write!(f, "capability is not declared in the app manifest")
            }
            ConsentStatus::UserPromptRequired => write!(f, "capability user prompt required"),
        }
    }
}

/// Completion callback handed to the consent service
pub type ConsentCallback = Box<dyn FnOnce(ConsentStatus) + Send>;

/// Platform service that asks for sensor access
pub trait ConsentService: Send + Sync {
    /// Request access for `capability`
    ///
    /// The service must invoke `on_complete` at most once, from any thread.
    /// Dropping it without calling it is reported as an unexpected outcome.
    fn request_access(&self, capability: Capability, on_complete: ConsentCallback);
}

/// One-shot state for a single capability
#[derive(Default)]
struct ConsentSlot {
    receiver: Mutex<Option<oneshot::Receiver<ConsentStatus>>>,
    /// `None` inside means the wait ended without a decision
    decision: OnceLock<Option<ConsentStatus>>,
    requested: OnceLock<()>,
}

/// Per-instance consent state for the camera and IMU capabilities
#[derive(Default)]
pub struct ConsentGate {
    camera: ConsentSlot,
    imu: ConsentSlot,
}

impl ConsentGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, capability: Capability) -> &ConsentSlot {
        match capability {
            Capability::Camera => &self.camera,
            Capability::Imu => &self.imu,
        }
    }

    /// Issue the asynchronous consent request for `capability`
    ///
    /// Only the first call per capability reaches the service; repeated
    /// calls are ignored.
    pub fn request_consent(&self, service: &dyn ConsentService, capability: Capability) {
        let slot = self.slot(capability);
        if slot.requested.set(()).is_err() {
            debug!(%capability, "Consent already requested");
            return;
        }

        let (sender, receiver) = oneshot::channel();
        *slot
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(receiver);

        debug!(%capability, "Requesting consent");
        service.request_access(
            capability,
            Box::new(move |status| {
                // Receiver is gone only if the gate itself was dropped
                let _ = sender.send(status);
            }),
        );
    }

    /// Block until the decision for `capability` arrives
    ///
    /// # Returns
    /// * `Ok(())` - Access allowed
    /// * `Err(TrackingError::AccessDenied)` - Any other decision
    /// * `Err(TrackingError::Unexpected)` - Never requested, or the service
    ///   dropped the callback without answering
    pub fn await_consent(&self, capability: Capability) -> TrackingResult<()> {
        let slot = self.slot(capability);
        let decision = *slot.decision.get_or_init(|| {
            let receiver = slot
                .receiver
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            receiver.and_then(|rx| pollster::block_on(rx).ok())
        });

        match decision {
            Some(ConsentStatus::Allowed) => {
                info!(%capability, "Access is granted");
                Ok(())
            }
            Some(status) => {
                warn!(%capability, %status, "Sensor access refused");
                Err(TrackingError::AccessDenied { capability, status })
            }
            None => {
                warn!(%capability, "Consent wait ended without a decision");
                Err(TrackingError::Unexpected(capability))
            }
        }
    }

    /// Recorded decision, if the wait has completed
    pub fn decision(&self, capability: Capability) -> Option<ConsentStatus> {
        self.slot(capability).decision.get().copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Holds callbacks so the test decides when to answer
    #[derive(Default)]
    struct DeferredConsent {
        pending: Mutex<Vec<(Capability, ConsentCallback)>>,
    }

    impl DeferredConsent {
        fn answer(&self, capability: Capability, status: ConsentStatus) {
            let mut pending = self.pending.lock().unwrap();
            let index = pending.iter().position(|(c, _)| *c == capability).unwrap();
            let (_, callback) = pending.remove(index);
            callback(status);
        }

        fn drop_all(&self) {
            self.pending.lock().unwrap().clear();
        }
    }

    impl ConsentService for DeferredConsent {
        fn request_access(&self, capability: Capability, on_complete: ConsentCallback) {
            self.pending.lock().unwrap().push((capability, on_complete));
        }
    }

    #[test]
    fn test_allowed_unblocks_waiter() {
        let gate = Arc::new(ConsentGate::new());
        let service = Arc::new(DeferredConsent::default());
        gate.request_consent(service.as_ref(), Capability::Camera);

        let waiter_gate = Arc::clone(&gate);
        let waiter = thread::spawn(move || waiter_gate.await_consent(Capability::Camera));

        thread::sleep(Duration::from_millis(20));
        service.answer(Capability::Camera, ConsentStatus::Allowed);

        assert!(waiter.join().unwrap().is_ok());
        assert_eq!(gate.decision(Capability::Camera), Some(ConsentStatus::Allowed));
        // Recorded decision is returned again without blocking
        assert!(gate.await_consent(Capability::Camera).is_ok());
    }

    #[test]
    fn test_denials_map_to_access_denied() {
        for status in [
            ConsentStatus::DeniedBySystem,
            ConsentStatus::DeniedByUser,
            ConsentStatus::CapabilityNotDeclared,
            ConsentStatus::UserPromptRequired,
        ] {
            let gate = ConsentGate::new();
            let service = DeferredConsent::default();
            gate.request_consent(&service, Capability::Imu);
            service.answer(Capability::Imu, status);

            match gate.await_consent(Capability::Imu) {
                Err(TrackingError::AccessDenied { capability, status: s }) => {
                    assert_eq!(capability, Capability::Imu);
                    assert_eq!(s, status);
                }
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn test_dropped_callback_is_unexpected() {
        let gate = ConsentGate::new();
        let service = DeferredConsent::default();
        gate.request_consent(&service, Capability::Camera);
        service.drop_all();

        assert!(matches!(
            gate.await_consent(Capability::Camera),
            Err(TrackingError::Unexpected(Capability::Camera))
        ));
        assert_eq!(gate.decision(Capability::Camera), None);
    }

    #[test]
    fn test_never_requested_is_unexpected() {
        let gate = ConsentGate::new();
        assert!(matches!(
            gate.await_consent(Capability::Camera),
            Err(TrackingError::Unexpected(_))
        ));
    }

    #[test]
    fn test_capabilities_are_independent() {
        let gate = ConsentGate::new();
        let service = DeferredConsent::default();
        gate.request_consent(&service, Capability::Camera);
        gate.request_consent(&service, Capability::Imu);
        // Second request for the same capability is ignored
        gate.request_consent(&service, Capability::Camera);
        assert_eq!(service.pending.lock().unwrap().len(), 2);

        service.answer(Capability::Imu, ConsentStatus::DeniedByUser);
        service.answer(Capability::Camera, ConsentStatus::Allowed);

        assert!(gate.await_consent(Capability::Camera).is_ok());
        assert!(gate.await_consent(Capability::Imu).is_err());
    }
}

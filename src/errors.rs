// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the tracking pipeline
//!
//! Construction-time failures (no sensor, no consent) surface as
//! [`TrackingError`]. Per-frame conditions such as duplicate frames or an
//! unresolved device pose are not errors; they are consumed inside the
//! acquisition loop as control-flow signals.

use std::fmt;

use crate::backends::consent::{Capability, ConsentStatus};
use crate::backends::sensor::SensorError;

/// Result type alias using TrackingError
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Main error type
#[derive(Debug, Clone)]
pub enum TrackingError {
    /// Consent for a capability was not granted
    AccessDenied {
        capability: Capability,
        status: ConsentStatus,
    },
    /// The consent wait returned without a decision
    Unexpected(Capability),
    /// Sensor enumeration or initialization failed
    ResourceUnavailable(String),
    /// Sensor error while streaming
    Sensor(SensorError),
    /// Fault inside the acquisition loop body
    RuntimeFault(String),
    /// Configuration errors
    Config(String),
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingError::AccessDenied { capability, status } => {
                write!(f, "{} access denied: {}", capability, status)
            }
            TrackingError::Unexpected(capability) => {
                write!(f, "No consent response received for {}", capability)
            }
            TrackingError::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
            TrackingError::Sensor(e) => write!(f, "Sensor error: {}", e),
            TrackingError::RuntimeFault(msg) => write!(f, "Acquisition fault: {}", msg),
            TrackingError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TrackingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackingError::Sensor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SensorError> for TrackingError {
    fn from(err: SensorError) -> Self {
        TrackingError::Sensor(err)
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        TrackingError::Config(err.to_string())
    }
}

impl From<std::io::Error> for TrackingError {
    fn from(err: std::io::Error) -> Self {
        TrackingError::Config(err.to_string())
    }
}

impl TrackingError {
    /// Whether this error is a consent failure (any reason)
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            TrackingError::AccessDenied { .. } | TrackingError::Unexpected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_access_denied() {
        let err = TrackingError::AccessDenied {
            capability: Capability::Camera,
            status: ConsentStatus::DeniedByUser,
        };
        let msg = err.to_string();
        assert!(msg.contains("camera"));
        assert!(msg.contains("user"));
        assert!(err.is_access_denied());
    }

    #[test]
    fn test_sensor_error_conversion() {
        let err: TrackingError = SensorError::StreamClosed.into();
        assert!(matches!(err, TrackingError::Sensor(SensorError::StreamClosed)));
        assert!(!err.is_access_denied());
        assert!(std::error::Error::source(&err).is_some());
    }
}

//! Error types for the node disk agent
//!
//! Provides structured error types for all agent components including
//! hardware probing, record reconciliation, and the udev event path.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the agent
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Node name not set; NODE_NAME must be provided")]
    NodeNameMissing,

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    // =========================================================================
    // Hardware Probe Errors
    // =========================================================================
    #[error("Hardware probe failed: {0}")]
    HardwareProbe(String),

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    // =========================================================================
    // Filesystem Operation Errors
    // =========================================================================
    #[error("Failed to format {device} as {fs_type}: {reason}")]
    FormatFailed {
        device: String,
        fs_type: String,
        reason: String,
    },

    #[error("Failed to mount {device} at {mount_point}: {reason}")]
    MountFailed {
        device: String,
        mount_point: String,
        reason: String,
    },

    // =========================================================================
    // Event Source Errors
    // =========================================================================
    #[error("Event source error: {0}")]
    EventSource(String),

    #[error("Malformed device event: {0}")]
    EventParse(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_) | Error::EventSource(_) => ErrorAction::RequeueWithBackoff,

            // The device may still be settling after a hotplug
            Error::DeviceNotFound { .. } => ErrorAction::RequeueAfter(Duration::from_secs(10)),

            // Recorded on the Mounted condition; wait for spec changes
            Error::FormatFailed { .. } | Error::MountFailed { .. } => ErrorAction::NoRequeue,

            // Configuration/validation errors - don't retry automatically
            Error::Configuration(_) | Error::NodeNameMissing | Error::EventParse(_) => {
                ErrorAction::NoRequeue
            }

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::EventSource(_))
    }
}

/// Result type alias for the agent
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::DeviceNotFound {
            device: "/dev/sdx".into(),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(10))
        );

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::EventSource("socket closed".into());
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::EventSource("netlink closed".into());
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let mount_err = Error::MountFailed {
            device: "/dev/sdb1".into(),
            mount_point: "/var/lib/disks/1".into(),
            reason: "wrong fs type".into(),
        };
        assert!(!mount_err.is_retryable());
        assert!(!mount_err.is_transient());
    }
}

//! Domain errors. Used by ports, adapters and the reconciler.
//!
//! Adapters map HTTP/transport failures into these; every variant has exactly one
//! [`ErrorClass`] which decides what the reconciler does next.

use thiserror::Error;

/// What the reconciler should do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Cannot self-correct by retrying. The process exits.
    Fatal,
    /// The corrective action is fast and already done (e.g. session dropped); retry now.
    RetryableImmediate,
    /// Transient trouble on the other side; retry after the retry interval.
    RetryableDelayed,
    /// Not a known failure pattern. Treated as a defect, never retried.
    Unclassified,
}

#[derive(Error, Debug)]
pub enum GlueforwardError {
    /// Credentials rejected (gluetun API key, or a service login).
    #[error("Failed to authenticate to {service} ({status}): {body}")]
    AuthFailed {
        service: String,
        status: u16,
        body: String,
    },

    /// A previously valid session was rejected mid-use and has been cleared.
    #[error("{service} needs reauthentication")]
    ReauthNeeded { service: String },

    /// Connection refused, reset or closed early, DNS failure or timeout.
    #[error("Failed to reach {service} at {target}: {reason}")]
    Unreachable {
        service: String,
        target: String,
        reason: String,
    },

    #[error("Failed to get forwarded port from gluetun ({status}): {body}")]
    GetPortFailed { status: u16, body: String },

    #[error("Failed to set {service} listening port ({status}): {body}")]
    SetPortFailed {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Invalid port {port} - must be between 1024 and 65535")]
    IllegalPort { port: u32 },

    #[error("Unexpected response from {service} ({status}): {body}")]
    UnexpectedStatus {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {service}: {reason}")]
    MalformedResponse { service: String, reason: String },

    #[error("Unusable configuration document: {reason}")]
    ConfigDocument { reason: String },

    #[error("HTTP error talking to {service}: {reason}")]
    Http { service: String, reason: String },
}

impl GlueforwardError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AuthFailed { .. } => ErrorClass::Fatal,
            Self::ReauthNeeded { .. } => ErrorClass::RetryableImmediate,
            Self::Unreachable { .. }
            | Self::GetPortFailed { .. }
            | Self::SetPortFailed { .. }
            // Cannot become valid by waiting; still retried on the delay.
            | Self::IllegalPort { .. } => ErrorClass::RetryableDelayed,
            Self::UnexpectedStatus { .. }
            | Self::MalformedResponse { .. }
            | Self::ConfigDocument { .. }
            | Self::Http { .. } => ErrorClass::Unclassified,
        }
    }
}

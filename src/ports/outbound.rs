//! Outbound ports. The reconciler calls into infrastructure through these.
//!
//! Implemented by adapters.

use crate::domain::{ForwardedPort, GlueforwardError};

/// Source of the currently forwarded port (gluetun control server).
#[async_trait::async_trait]
pub trait PortSource: Send + Sync {
    /// Query the VPN helper for the port it currently forwards.
    async fn get_forwarded_port(&self) -> Result<ForwardedPort, GlueforwardError>;
}

/// A downstream service whose listening port follows the forwarded port.
///
/// Authentication is internal to each implementation: it happens lazily on the
/// first `set_port` and again after the service reports the session expired.
/// Callers only ever see the classified outcome.
#[async_trait::async_trait]
pub trait ServiceClient: Send {
    /// Human-readable service name, used in logs.
    fn name(&self) -> &str;

    /// Apply `port` as the service's listening port.
    ///
    /// # Errors
    /// Returns a `GlueforwardError` whose [`class`](GlueforwardError::class)
    /// tells the caller whether and when to retry.
    async fn set_port(&mut self, port: ForwardedPort) -> Result<(), GlueforwardError>;
}

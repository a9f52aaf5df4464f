//! Port traits. API boundaries for the hexagon.
//!
//! Outbound only: the reconciler calls into infrastructure (gluetun, services).

pub mod outbound;

pub use outbound::{PortSource, ServiceClient};

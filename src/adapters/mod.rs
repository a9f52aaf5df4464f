//! Infrastructure adapters. Implement outbound ports.
//!
//! gluetun (port source), qBittorrent and slskd (service clients). Map HTTP errors
//! to GlueforwardError through the shared `http` policy.

pub mod gluetun;
pub mod http;
pub mod qbittorrent;
pub mod slskd;

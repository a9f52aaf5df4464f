//! gluetun adapter. Source of the forwarded port.

pub mod client;

pub use client::GluetunClient;

//! slskd adapter.

pub mod client;
pub mod options;

pub use client::SlskdClient;

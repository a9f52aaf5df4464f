//! Core domain layer. No external I/O dependencies.
//!
//! Entities and the error taxonomy live here. Dependencies flow inward.

pub mod entities;
pub mod errors;

pub use entities::{Credentials, ForwardedPort, ServiceKind};
pub use errors::{ErrorClass, GlueforwardError};

//! Process exit codes. Stable across releases; container orchestration keys off them.

use crate::domain::{ErrorClass, GlueforwardError};
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReturnCode {
    /// A required setting is missing or invalid.
    MissingConfig = 1,
    /// gluetun or the service rejected the configured credentials.
    AuthFailed = 2,
    /// Unclassified failure: a bug or an unexpected API change.
    Unexpected = 3,
}

impl ReturnCode {
    /// Exit code for the error that stopped the reconciler.
    pub fn for_error(err: &GlueforwardError) -> Self {
        match err.class() {
            ErrorClass::Fatal => Self::AuthFailed,
            _ => Self::Unexpected,
        }
    }
}

impl From<ReturnCode> for ExitCode {
    fn from(code: ReturnCode) -> Self {
        ExitCode::from(code as u8)
    }
}

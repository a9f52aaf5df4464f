//! Cross-cutting concerns: configuration and exit codes.

pub mod config;
pub mod exit_codes;

pub use self::config::{AppConfig, Settings, SettingsError};
pub use exit_codes::ReturnCode;

//! Domain entities. Plain values passed between the port source, the reconciler
//! and the service clients.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Port number as reported by gluetun. No range constraint at the source;
/// service clients enforce their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForwardedPort(u32);

impl ForwardedPort {
    pub const fn new(port: u32) -> Self {
        Self(port)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ForwardedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which downstream service this instance keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceKind {
    #[default]
    Qbittorrent,
    Slskd,
}

impl ServiceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qbittorrent => "qbittorrent",
            Self::Slskd => "slskd",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qbittorrent" => Ok(Self::Qbittorrent),
            "slskd" => Ok(Self::Slskd),
            other => Err(format!(
                "unknown service type '{}' (expected qbittorrent or slskd)",
                other
            )),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login credentials for a downstream service. `Debug` never prints the password.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

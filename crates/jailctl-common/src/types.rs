//! Domain primitive types used across the jailctl workspace.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JailError;

/// Kernel-assigned numeric jail identifier.
///
/// Always at least 1 and stable for as long as the jail is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JailId(u32);

impl JailId {
    /// Creates a jail id, returning `None` for the reserved value 0.
    #[must_use]
    pub const fn new(id: u32) -> Option<Self> {
        if id == 0 { None } else { Some(Self(id)) }
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a caller identified a jail on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JailKey {
    /// The key was entirely numeric.
    Id(JailId),
    /// Anything else is matched against the hostname.
    Name(String),
}

impl FromStr for JailKey {
    type Err = JailError;

    /// A key that is entirely an integer (leading whitespace and a sign
    /// allowed) is an id and never a hostname, even if some jail happens to
    /// be named like a number. Zero, negative, empty and out-of-range
    /// numeric keys are [`JailError::InvalidId`].
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let invalid = || JailError::InvalidId { key: key.into() };
        let signed = key.trim_start_matches(|c: char| c.is_ascii_whitespace());
        let digits = signed.strip_prefix(['+', '-']).unwrap_or(signed);

        if key.is_empty() {
            return Err(invalid());
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(Self::Name(key.to_string()));
        }
        if signed.starts_with('-') {
            return Err(invalid());
        }
        digits
            .parse::<u32>()
            .ok()
            .and_then(JailId::new)
            .map(Self::Id)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for JailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A live jail as reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Numeric jail id.
    pub id: JailId,
    /// Hostname, unique among live jails.
    pub hostname: String,
    /// Filesystem root of the jail.
    pub path: PathBuf,
    /// Addresses bound to the jail, IPv4 first.
    pub addresses: Vec<IpAddr>,
}

/// One process as seen in a single snapshot.
///
/// Only valid for the lifetime of the snapshot that produced it: pids are
/// reused by the kernel and are never a permanent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process id.
    pub pid: u32,
    /// Whether the kernel flags this process as running inside some jail.
    pub jailed: bool,
    /// Short command name.
    pub command: String,
    /// Name of the owning jail, when it has been resolved.
    pub jail: Option<String>,
}

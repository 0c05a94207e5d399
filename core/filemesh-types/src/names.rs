//! Name types that cross a trust boundary.
//!
//! File names arrive from peers and from the local directory listing, and
//! peer addresses arrive from configuration. Both are validated once, here,
//! so the rest of the code can rely on the invariants.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of in-flight staging files inside the storage directory.
/// Names with this prefix are never listed, fetched or accepted from peers.
pub const STAGING_PREFIX: &str = ".filemesh-partial-";

/// A bare file name, safe to join onto the storage root.
///
/// Holds no path separators, is not `.` or `..`, contains no NUL byte and
/// does not collide with the staging prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    /// Reduces an untrusted name to its base name.
    ///
    /// Anything up to the last `/` or `\` is dropped, so
    /// `../../etc/passwd` becomes `passwd`. Names that are empty or
    /// otherwise unusable after reduction are rejected.
    pub fn sanitize(raw: &str) -> Result<Self> {
        let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
        if base.is_empty()
            || base == "."
            || base == ".."
            || base.contains('\0')
            || base.starts_with(STAGING_PREFIX)
        {
            return Err(Error::InvalidFileName(raw.to_string()));
        }
        Ok(Self(base.to_string()))
    }

    /// Accepts a name only if sanitizing it leaves it unchanged.
    pub fn parse(raw: &str) -> Result<Self> {
        let name = Self::sanitize(raw)?;
        if name.0 != raw {
            return Err(Error::InvalidFileName(raw.to_string()));
        }
        Ok(name)
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FileName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FileName> for String {
    fn from(name: FileName) -> Self {
        name.0
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Address of another node, in `host:port` form.
///
/// Hosts may be names, IPv4 literals or bracketed IPv6 literals. The port
/// must be non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Parses and validates a `host:port` string.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || Error::InvalidPeerAddress(raw.to_string());
        let trimmed = raw.trim();
        let (host, port) = trimmed.rsplit_once(':').ok_or_else(invalid)?;

        if host.is_empty()
            || host.contains(['/', '?', '#', '@'])
            || host.contains(char::is_whitespace)
        {
            return Err(invalid());
        }
        let bracketed = host.starts_with('[') && host.ends_with(']');
        if host.contains(':') && !bracketed {
            return Err(invalid());
        }
        match port.parse::<u16>() {
            Ok(p) if p != 0 => Ok(Self(trimmed.to_string())),
            _ => Err(invalid()),
        }
    }

    /// Base URL for HTTP requests to this peer.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.0)
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.0
    }
}

impl From<std::net::SocketAddr> for PeerAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

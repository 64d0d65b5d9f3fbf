//! Peer and socket identifiers.
//!
//! `PeerId` is an opaque handle for a remote participant handed out by the identity
//! collaborator. `SocketName` names one logical channel with a peer and is validated
//! on construction, so every `SocketName` in circulation is well formed.

use std::{borrow::Borrow, fmt, str::FromStr};

use crate::{
    constants::MAX_SOCKET_NAME_LENGTH,
    error::{ErrorKind, Result},
};

/// Opaque identifier of a participant (local or remote).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(String);

impl PeerId {
    /// Wraps a raw identifier. No validation happens here; see [`PeerId::is_valid`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id that stands in for "no user".
    pub fn invalid() -> Self {
        Self(String::new())
    }

    /// An id is valid when it is non-empty and purely ASCII alphanumeric.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self> {
        let id = PeerId::new(s);
        if id.is_valid() {
            Ok(id)
        } else {
            Err(ErrorKind::InvalidPeerId(s.to_owned()))
        }
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId::new(s)
    }
}

/// Name of a socket connection: 1-32 ASCII alphanumeric characters, case-sensitive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketName(String);

impl SocketName {
    /// Validates and wraps a socket name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(ErrorKind::InvalidSocketName(name))
        }
    }

    /// Returns true if `name` would make a valid socket name.
    pub fn is_valid(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_SOCKET_NAME_LENGTH
            && name.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SocketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SocketName {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self> {
        SocketName::new(s)
    }
}

impl TryFrom<&str> for SocketName {
    type Error = ErrorKind;

    fn try_from(s: &str) -> Result<Self> {
        SocketName::new(s)
    }
}

impl Borrow<str> for SocketName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SocketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_validity() {
        assert!(PeerId::new("0002a1b2c3d4e5f6").is_valid());
        assert!(!PeerId::invalid().is_valid());
        assert!(!PeerId::new("has space").is_valid());
        assert!(!PeerId::new("dash-ed").is_valid());
    }

    #[test]
    fn test_peer_id_from_str() {
        let id: PeerId = "abc123".parse().unwrap();
        assert_eq!(id.to_string(), "abc123");
        assert_eq!("".parse::<PeerId>(), Err(ErrorKind::InvalidPeerId(String::new())));
    }

    #[test]
    fn test_socket_name_accepts_alphanumeric() {
        assert!(SocketName::new("Game").is_ok());
        assert!(SocketName::new("a").is_ok());
        assert!(SocketName::new("A".repeat(32)).is_ok());
        assert!(SocketName::new("Chat2").is_ok());
    }

    #[test]
    fn test_socket_name_rejects_invalid() {
        assert!(SocketName::new("").is_err());
        assert!(SocketName::new("A".repeat(33)).is_err());
        assert!(SocketName::new("with space").is_err());
        assert!(SocketName::new("under_score").is_err());
        assert!(SocketName::new("caf\u{e9}").is_err());
    }

    #[test]
    fn test_socket_name_is_case_sensitive() {
        let lower = SocketName::new("game").unwrap();
        let upper = SocketName::new("Game").unwrap();
        assert_ne!(lower, upper);
    }
}

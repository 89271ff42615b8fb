//! Small newtype wrappers around the node's core identifiers.
//!
//! Keeping these as distinct types (rather than passing bare `String`s
//! around) means a peer address can never be mistaken for a nickname or a
//! relay id at a call site — the compiler catches it.

use std::fmt;

use rand::Rng;

/// A normalized radio address: uppercase hex, punctuation stripped.
///
/// Two addresses that differ only in case or separators (`aa:bb:cc` vs
/// `AABBCC`) normalize to the same `PeerAddress`, which is what makes the
/// connection manager's admission dedup work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Normalizes a raw transport-reported address: uppercase, strip
    /// anything that isn't a hex digit.
    pub fn normalize(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        PeerAddress(cleaned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The wildcard destination used for broadcast relay frames.
    pub fn broadcast() -> &'static str {
        "*"
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(raw: &str) -> Self {
        PeerAddress::normalize(raw)
    }
}

/// A free-form display name. No length cap is specified for this protocol,
/// but we trim surrounding whitespace so a nickname broadcast never carries
/// stray newline fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nickname(String);

impl Nickname {
    pub fn new(raw: impl Into<String>) -> Self {
        Nickname(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for Nickname {
    fn default() -> Self {
        Nickname("anonymous".to_string())
    }
}

/// An 8-hex-character relay message id, synthesized once per message as it
/// enters the mesh and carried unchanged through every subsequent forward.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh random id: 4 random bytes, hex-encoded.
    pub fn generate() -> Self {
        let bytes: [u8; 4] = rand::rng().random();
        MessageId(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(raw: &str) -> Self {
        MessageId(raw.to_string())
    }
}

/// Which side initiated a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

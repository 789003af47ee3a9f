//! Strong type definitions for stagechain.
//!
//! Stage identifiers and access headers are newtypes so a header value can
//! never be passed where a stage id is expected.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

/// An opaque, unguessable stage identifier.
///
/// Drawn from the lowercase-alphanumeric token alphabet; unique across the store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(String);

impl StageId {
    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageId({})", self.0)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A request header a stage requires before it is delivered.
///
/// Name and value always travel together: a stage either requires a header
/// or it does not.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessHeader {
    /// Header name, matched case-insensitively.
    pub name: String,
    /// Header value, matched byte-exactly.
    pub value: String,
}

impl AccessHeader {
    /// Create a new access header requirement.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Check a presented value against the required one.
    pub fn accepts(&self, presented: Option<&str>) -> bool {
        presented.is_some_and(|v| v.as_bytes() == self.value.as_bytes())
    }
}

// Values are bearer tokens; keep them out of debug output.
impl fmt::Debug for AccessHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessHeader")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// One persisted stage of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// Unique stage id.
    pub id: StageId,
    /// Raw stage content, served verbatim.
    pub content: Bytes,
    /// Header the request must present, if any.
    pub access: Option<AccessHeader>,
    /// Expiry instant (Unix ms). The record is unreadable once `now > expires_at`.
    pub expires_at: i64,
}

impl StageRecord {
    /// Whether the record has expired at `now` (Unix ms).
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// Content as UTF-8 text, if it is valid UTF-8.
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// The role a stage plays in a chain, in fetch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Checks the entry-point checksum, then forwards the first key part.
    Verification,
    /// Reconstructs the key, fetches the payload, decrypts and executes it.
    Decrypt,
    /// The obfuscated script itself.
    Payload,
}

impl StageRole {
    /// All roles, in the order a client fetches them.
    pub const FETCH_ORDER: [StageRole; 3] =
        [StageRole::Verification, StageRole::Decrypt, StageRole::Payload];

    /// Human-readable description of what the stage does.
    pub fn description(&self) -> &'static str {
        match self {
            StageRole::Verification => {
                "Intermediate loader: verifies the entry point, fetches the decryption loader, \
                 and passes part of the key."
            }
            StageRole::Decrypt => {
                "Decryption loader: reconstructs the key, fetches the payload, decrypts, \
                 and executes."
            }
            StageRole::Payload => {
                "Encrypted payload: the original script, XOR encrypted and Base64 encoded."
            }
        }
    }
}

/// The payload key, partitioned across two stages.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySplit {
    part1: String,
    part2: String,
}

impl KeySplit {
    /// Split `key` at byte offset `at`.
    ///
    /// Both parts must be non-empty so that neither stage holds the whole key.
    pub fn split(key: &str, at: usize) -> Result<Self> {
        if at == 0 || at >= key.len() {
            return Err(ChainError::InvalidConfig(format!(
                "split point {} outside 1..{}",
                at,
                key.len()
            )));
        }
        if !key.is_char_boundary(at) {
            return Err(ChainError::InvalidConfig(format!(
                "split point {} is not a character boundary",
                at
            )));
        }
        let (part1, part2) = key.split_at(at);
        Ok(Self {
            part1: part1.to_string(),
            part2: part2.to_string(),
        })
    }

    /// The part embedded in the verification stage.
    pub fn part1(&self) -> &str {
        &self.part1
    }

    /// The part embedded in the decrypt stage.
    pub fn part2(&self) -> &str {
        &self.part2
    }

    /// Reassemble the full key.
    pub fn full(&self) -> String {
        let mut key = String::with_capacity(self.part1.len() + self.part2.len());
        key.push_str(&self.part1);
        key.push_str(&self.part2);
        key
    }
}

impl fmt::Debug for KeySplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KeySplit({} + {} bytes)",
            self.part1.len(),
            self.part2.len()
        )
    }
}

/// The runtime argument a stage receives when invoked by its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput {
    /// Entry point -> verification stage.
    Verification {
        /// Checksum of the entry point's fetch expression.
        checksum: u8,
    },
    /// Verification stage -> decrypt stage.
    Decrypt {
        /// First half of the payload key.
        key_part1: String,
    },
}

impl StageInput {
    /// The stage role that consumes this input.
    pub fn role(&self) -> StageRole {
        match self {
            StageInput::Verification { .. } => StageRole::Verification,
            StageInput::Decrypt { .. } => StageRole::Decrypt,
        }
    }

    /// Render as a call argument list, e.g. `(42)` or `("abc")`.
    pub fn call_args(&self) -> String {
        match self {
            StageInput::Verification { checksum } => format!("({})", checksum),
            StageInput::Decrypt { key_part1 } => format!("(\"{}\")", key_part1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_split_reassembles() {
        let split = KeySplit::split("abcdefgh", 3).unwrap();
        assert_eq!(split.part1(), "abc");
        assert_eq!(split.part2(), "defgh");
        assert_eq!(split.full(), "abcdefgh");
    }

    #[test]
    fn test_key_split_rejects_degenerate_points() {
        assert!(KeySplit::split("abcd", 0).is_err());
        assert!(KeySplit::split("abcd", 4).is_err());
        assert!(KeySplit::split("abcd", 9).is_err());
    }

    #[test]
    fn test_key_split_debug_hides_key() {
        let split = KeySplit::split("secretkey", 4).unwrap();
        let debug = format!("{:?}", split);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_access_header_exact_match() {
        let header = AccessHeader::new("X-Auth-abc", "token123");
        assert!(header.accepts(Some("token123")));
        assert!(!header.accepts(Some("TOKEN123")));
        assert!(!header.accepts(Some("token1234")));
        assert!(!header.accepts(None));
    }

    #[test]
    fn test_record_expiry_boundary() {
        let record = StageRecord {
            id: StageId::from("abc"),
            content: Bytes::from_static(b"x"),
            access: None,
            expires_at: 1_000,
        };
        assert!(!record.is_expired(999));
        assert!(!record.is_expired(1_000));
        assert!(record.is_expired(1_001));
    }

    #[test]
    fn test_stage_input_call_args() {
        assert_eq!(StageInput::Verification { checksum: 7 }.call_args(), "(7)");
        assert_eq!(
            StageInput::Decrypt {
                key_part1: "Ab_c".into()
            }
            .call_args(),
            "(\"Ab_c\")"
        );
    }
}

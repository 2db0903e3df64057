//! Checksums of source files, archive entries, and configuration trees.
//!
//! [`ContentHash`] is an XXH3-128 value. It is persisted as a 32-digit hex
//! string so state files stay readable. [`DigestBuilder`] hashes structured
//! records field by field with length framing, so no two different field
//! sequences share a byte stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

/// A 128-bit XXH3 checksum.
///
/// Equal hashes are taken to mean equal content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Checksum of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxh3_128(data).to_le_bytes())
    }
}

/// Error returned when a string is not a 32-digit hex checksum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid checksum '{input}': expected 32 hex digits")]
pub struct ParseHashError {
    input: String,
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHashError {
            input: s.to_string(),
        };
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ParseHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_string();
        write!(f, "ContentHash({}..)", &hex[..8])
    }
}

/// Incremental checksum over a sequence of framed fields.
///
/// Every field is preceded by its length and every marker is a single byte,
/// so field contents can never imitate a field boundary.
pub struct DigestBuilder {
    state: Xxh3,
}

impl DigestBuilder {
    /// Starts an empty digest.
    pub fn new() -> Self {
        Self { state: Xxh3::new() }
    }

    /// Adds a length-prefixed byte field.
    pub fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.state.update(&(bytes.len() as u64).to_le_bytes());
        self.state.update(bytes);
        self
    }

    /// Adds a one-byte marker, such as a presence flag.
    pub fn marker(&mut self, byte: u8) -> &mut Self {
        self.state.update(&[byte]);
        self
    }

    /// Adds a count.
    pub fn count(&mut self, n: usize) -> &mut Self {
        self.state.update(&(n as u64).to_le_bytes());
        self
    }

    /// The checksum of everything added so far.
    pub fn finish(&self) -> ContentHash {
        ContentHash(self.state.digest128().to_le_bytes())
    }
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

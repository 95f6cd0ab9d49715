//! Content hashing and streaming structural fingerprints.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// A 128-bit XXH3 content hash.
///
/// Used as the structural fingerprint of a module during deduplication: two
/// modules that differ only in names and annotations hash identically.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Streaming fingerprint builder.
///
/// Feeds tagged integers into an XXH3 state while also keeping the raw byte
/// stream, so that callers can confirm a hash match with an exact comparison
/// before acting on it.
#[derive(Default)]
pub struct Fingerprinter {
    state: Xxh3,
    bytes: Vec<u8>,
}

impl Fingerprinter {
    /// Creates an empty fingerprinter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mixes a single tag byte.
    pub fn tag(&mut self, tag: u8) {
        self.write(&[tag]);
    }

    /// Mixes a `u32` in little-endian order.
    pub fn u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    /// Mixes a `u64` in little-endian order.
    pub fn u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    /// Mixes a boolean.
    pub fn bool(&mut self, value: bool) {
        self.tag(u8::from(value));
    }

    fn write(&mut self, data: &[u8]) {
        self.state.update(data);
        self.bytes.extend_from_slice(data);
    }

    /// Finishes the fingerprint, returning the hash and the exact byte stream.
    pub fn finish(self) -> (ContentHash, Vec<u8>) {
        (
            ContentHash(self.state.digest128().to_le_bytes()),
            self.bytes,
        )
    }
}

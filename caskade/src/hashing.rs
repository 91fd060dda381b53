//! The 32-byte cryptographic digest used to address blob contents, and a
//! streaming hasher over the same algorithm used to seal checkpoint segments.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::basex::B62;

/// 32-byte SHA-256 digest of a byte sequence. Equality and order are over
/// the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashKey(pub(crate) [u8; 32]);

impl HashKey {
    pub const LEN: usize = 32;

    /// Digest of the empty byte string. Used as the bootstrap cask's
    /// `prev_checkpoint_id` sentinel.
    pub const NULL: HashKey = HashKey([
        0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
        0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
        0xb8, 0x55,
    ]);

    pub fn of(bytes: &[u8]) -> HashKey {
        HashKey(Sha256::digest(bytes).into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> HashKey {
        HashKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashKey({})", B62.encode(&self.0))
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", B62.encode(&self.0))
    }
}

/// Streaming SHA-256 hasher, matching the `Hasher` collaborator described in
/// spec.md: incremental `update`, final `digest`.
#[derive(Default)]
pub struct Hasher {
    sha: Sha256,
}

impl Hasher {
    pub fn new() -> Hasher {
        Hasher { sha: Sha256::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.sha.update(bytes);
        self
    }

    pub fn digest(self) -> HashKey {
        HashKey(self.sha.finalize().into())
    }
}

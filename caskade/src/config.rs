//! Per-caskade tunables, persisted alongside the directory as JSON, plus the
//! signer contract used to seal checkpoints.

use serde::{Deserialize, Serialize};

use crate::error::CaskadeError;
use crate::hashing::Hasher;
use crate::ids::Rake;

/// Unit of size accounting used throughout the defaults below.
pub const CHUNK_SIZE: u64 = 1 << 21;
pub const CHUNK_SIZE_2X: u64 = CHUNK_SIZE * 2;
/// Hard ceiling on a single cask's size before a rollover is mandatory.
pub const MAX_CASK_SIZE: u64 = 1 << 31;

/// Signs and validates checkpoint digests. `HasherSigner` is the only
/// implementation this build ships; the trait exists so a caskade can be
/// opened unsigned (`signer: None`).
pub trait Signer: std::fmt::Debug {
    fn signature_size(&self) -> usize;
    fn sign(&self, message: &[u8]) -> Vec<u8>;
    fn validate(&self, message: &[u8], signature: &[u8]) -> bool {
        self.sign(message) == signature
    }
}

/// `sign(msg) = SHA256(msg ‖ secret)`. Symmetric: the same secret that signed
/// a checkpoint is required to validate it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasherSigner {
    secret: Vec<u8>,
}

impl HasherSigner {
    pub fn new(secret: Vec<u8>) -> HasherSigner {
        HasherSigner { secret }
    }
}

impl Signer for HasherSigner {
    fn signature_size(&self) -> usize {
        32
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut hasher = Hasher::new();
        hasher.update(message);
        hasher.update(&self.secret);
        hasher.digest().as_bytes().to_vec()
    }
}

/// The tagged variant persisted in `config.json`'s `signer` field (spec §6).
/// The secret itself never round-trips through JSON; it lives in
/// `.hs_etc/key.bin`, attached to `signer` after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignerKind {
    Hasher,
}

/// The configuration persisted at `<dir>/.hs_etc/config.json`. `signer` is
/// kept out of serialization: the secret lives in `key.bin` and is
/// re-attached by [`crate::Caskade::open`], per the documented non-goal on
/// secret recovery if that file is lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaskadeConfig {
    pub origin: Rake,
    pub max_cask_size: u64,
    pub checkpoint_size: u64,
    /// Time-based checkpoint trigger, in milliseconds. `None` disables it.
    pub checkpoint_ttl: Option<u64>,
    pub auto_chunk_cutoff: u64,
    pub signer_kind: Option<SignerKind>,
    #[serde(skip)]
    pub signer: Option<std::sync::Arc<dyn Signer + Send + Sync>>,
}

impl CaskadeConfig {
    pub fn new(origin: Rake) -> CaskadeConfig {
        CaskadeConfig {
            origin,
            max_cask_size: MAX_CASK_SIZE,
            checkpoint_size: CHUNK_SIZE * 128,
            checkpoint_ttl: None,
            auto_chunk_cutoff: CHUNK_SIZE_2X,
            signer_kind: None,
            signer: None,
        }
    }

    pub fn validate_config(&self) -> Result<(), CaskadeError> {
        if self.max_cask_size == 0 || self.max_cask_size > MAX_CASK_SIZE {
            return Err(CaskadeError::Config(format!(
                "max_cask_size must be in (0, {}]",
                MAX_CASK_SIZE
            )));
        }
        if self.checkpoint_size == 0 || self.checkpoint_size >= self.max_cask_size {
            return Err(CaskadeError::Config(
                "checkpoint_size must be smaller than max_cask_size".to_owned(),
            ));
        }
        if self.auto_chunk_cutoff == 0 || self.auto_chunk_cutoff >= self.checkpoint_size {
            return Err(CaskadeError::Config(
                "auto_chunk_cutoff must be smaller than checkpoint_size".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn signature_size(&self) -> usize {
        self.signer.as_ref().map_or(0, |s| s.signature_size())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signer
            .as_ref()
            .map_or_else(Vec::new, |s| s.sign(message))
    }

    pub fn validate_signature(&self, message: &[u8], signature: &[u8]) -> bool {
        match &self.signer {
            Some(s) => s.validate(message, signature),
            None => signature.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hasher_signer_round_trips() {
        let signer = HasherSigner::new(b"shh".to_vec());
        let sig = signer.sign(b"message");
        assert!(signer.validate(b"message", &sig));
        assert!(!signer.validate(b"other", &sig));
    }

    #[test]
    fn default_config_validates() {
        let cfg = CaskadeConfig::new(Rake::build_new(crate::ids::RAKE_TYPE_CASKADE).unwrap());
        assert!(cfg.validate_config().is_ok());
    }

    #[test]
    fn checkpoint_size_must_be_smaller_than_cask_size() {
        let mut cfg = CaskadeConfig::new(Rake::build_new(crate::ids::RAKE_TYPE_CASKADE).unwrap());
        cfg.checkpoint_size = cfg.max_cask_size;
        assert!(cfg.validate_config().is_err());
    }
}

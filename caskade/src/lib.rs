#![feature(error_generic_member_access)]

//! An append-only, content-addressed log store.
//!
//! A [`Caskade`] is a directory of segment files ("casks") that grows by
//! appending typed records: data blobs addressed by their hash, mutable
//! links from an anchor id to a hash, and periodic checkpoints that seal a
//! hashed segment and decide when a cask must roll over into the next one.
//! It is single-writer, supports pluggable storage backends for
//! deterministic tests, and recovers from unclean shutdowns by re-validating
//! the tail segment.

mod basex;
mod buffer;
mod caskade;
mod catalog;
mod config;
mod error;
mod file;
mod fs;
mod hashing;
mod ids;
mod model;
mod packer;
mod record;
mod segment;
pub mod test;

pub use caskade::Caskade;
pub use config::{CaskadeConfig, HasherSigner, Signer, SignerKind, CHUNK_SIZE, MAX_CASK_SIZE};
pub use error::CaskadeError;
pub use fs::{ConcreteSystem, Fd, FileSystem, FsError};
pub use hashing::{HashKey, Hasher};
pub use ids::{Cake, CakeTag, CaskId, Rake, RAKE_TYPE_CASKADE};
pub use model::{CheckPoint, DataLocation, ReadOptions, VALIDATE_ALL, VALIDATE_NONE};
pub use record::CheckPointType;

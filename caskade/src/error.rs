use std::{backtrace::Backtrace, io};

use crate::fs::FsError;

/// Errors surfaced by the codec layer when a buffer ends before a field is
/// fully decoded. Only ever escapes as [`CaskadeError::Format`], at the
/// truncation boundary `recover` finds.
#[derive(Debug, thiserror::Error)]
#[error("need {0} more byte(s)")]
pub(crate) struct NeedMoreBytes(pub usize);

/// Every way a caskade can fail to do what was asked of it.
#[derive(Debug, thiserror::Error)]
pub enum CaskadeError {
    #[error("not writable: {0}")]
    Access(String),

    #[error("hash mismatch for {0}")]
    DataValidation(String),

    #[error("cask changed during quiet period")]
    NotQuiet,

    #[error("checkpoint signature did not validate")]
    Signature,

    #[error("malformed cask data: {0}")]
    Format(String),

    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
        backtrace: Backtrace,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("entry not found for {0}")]
    NotFound(String),
}

//! Engine errors
//!
//! These abort a whole run. Problems confined to one file are reported as
//! [`crate::FileFailure`] instead.

use chainback_core::CodecError;
use chainback_journal::JournalError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source directory {} is not readable", .0.display())]
    SourceUnavailable(PathBuf),

    #[error("Failed to load ignore rules: {0:#}")]
    Ignore(anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Revision counter exhausted in generation {0}")]
    RevisionOverflow(u32),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

//! Error types for the mosaicing engine

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which mandatory chunk collection ran dry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Reference,
    Source,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Reference => write!(f, "reference"),
            PoolKind::Source => write!(f, "source"),
        }
    }
}

/// All errors produced by mosaic-core.
#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to load {}: {source:#}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0} pool is empty: no usable chunks remain, aborting")]
    EmptyPool(PoolKind),

    #[error("no source chunk matched reference chunk {reference_index} (internal invariant violated)")]
    MatchNotFound { reference_index: usize },

    #[error("chunk {chunk} has no normalized fingerprint; normalization must run before matching")]
    NotNormalized { chunk: usize },

    #[error("feature extraction failed: {0}")]
    Feature(String),

    #[error("failed to write output {}: {source:#}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("run cancelled")]
    Cancelled,
}

impl MosaicError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        MosaicError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MosaicError>;

use std::path::PathBuf;

use thiserror::Error;

/// Domain errors raised while preparing clips and batches.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown category {0:?}")]
    UnknownCategory(String),

    #[error("no category directory in clip path {}", .0.display())]
    MissingCategory(PathBuf),

    #[error("{which} split is empty ({total} clips available)")]
    EmptySplit { which: &'static str, total: usize },

    #[error("batch of {rows} rows cannot be grouped into (anchor, positive, negative) triples")]
    MalformedBatch { rows: usize },

    #[error("cannot build triplets: {0}")]
    NotEnoughTriplets(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tensor: {0}")]
    Tensor(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Custom error types for byte sources.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("File size of {found} bytes exceeds the maximum allowed size of {limit} bytes.")]
    FileTooLarge { limit: u64, found: u64 },

    #[error(
        "Read of {requested} bytes at offset {offset:#x} runs past the source. (available: {available})"
    )]
    ShortRead {
        offset: u64,
        requested: u64,
        available: u64,
    },

    #[error("An underlying I/O error occurred.")]
    StdIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;

//! Custom error types for region stores.

use thiserror::Error;

use crate::core::address::Address;
use crate::core::region::RegionId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("region `{name}` at {start} (+{size:#x} bytes) overlaps existing region `{existing}`")]
    Conflict {
        name: String,
        start: Address,
        size: u64,
        existing: String,
    },

    #[error("region `{name}` span wraps the address domain: {start} (+{size:#x} bytes)")]
    SpanOverflow {
        name: String,
        start: Address,
        size: u64,
    },

    #[error("zero-length region `{0}` rejected")]
    EmptyRegion(String),

    #[error("no region with id {0}")]
    UnknownRegion(RegionId),

    #[error("access outside region `{region}`: {addr} (+{len:#x} bytes)")]
    Access {
        region: String,
        addr: Address,
        len: u64,
    },

    #[error("region `{region}` has no initialized backing")]
    Uninitialized { region: String },

    #[error("memory map is locked")]
    Locked,

    #[error("map limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("initialization of region `{region}` cancelled after {copied:#x} bytes")]
    Cancelled { region: String, copied: u64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;

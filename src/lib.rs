//! Memforge models the construction of a target process's address space
//! from a loaded program image during static-analysis preparation.
//!
//! A [`RegionBuilder`] carves named, permission-tagged regions out of an
//! addressing domain backed by a [`RegionStore`]. Sections whose contents
//! may still change during the load are declared deferred and backfilled
//! from the original [`ByteSource`] image at the end of the session;
//! late-discovered byte ranges merge into whatever region already claims
//! their address.

/// Core data types module
pub mod core;

/// Region builder: creation, merge and finalize operations
pub mod builder;
/// Tracing initialization helpers
pub mod logging;
/// Cooperative cancellation handle
pub mod monitor;
/// Byte sources backing region contents
pub mod source;
/// Region stores and the in-memory map
pub mod store;

pub use crate::builder::{BuildError, RegionBuilder, ZERO_FILL};
pub use crate::core::address::{Address, AddressError, AddressSpace};
pub use crate::core::perms::Perms;
pub use crate::core::region::{Region, RegionId, RegionState};
pub use crate::monitor::LoadMonitor;
pub use crate::source::error::SourceError;
pub use crate::source::{ByteSource, FileSource, SliceSource, SourceLimits};
pub use crate::store::error::StoreError;
pub use crate::store::{MapLimits, MemoryMap, RegionStore};

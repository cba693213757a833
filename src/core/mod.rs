//! Core data types for program-image region modeling.
//!
//! This module contains the fundamental value types used throughout the
//! crate: addresses and addressing domains, permission triples, and the
//! region metadata that stores hand out.

pub mod address;
pub mod perms;
pub mod region;

pub use address::{Address, AddressError, AddressSpace};
pub use perms::Perms;
pub use region::{Region, RegionId, RegionState};

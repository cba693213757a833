//! Address types for program-image modeling.
//!
//! This module provides the `Address` value type and the `AddressSpace`
//! addressing domain that together anchor every region placement in the
//! crate. All arithmetic is checked: a load session never wraps or silently
//! escapes its space.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete location in modeled address space.
///
/// Addresses are plain 64-bit values; the owning [`AddressSpace`] decides
/// which values are representable. Construction goes through
/// [`AddressSpace::address`] or [`AddressSpace::address_at`] so an `Address`
/// in circulation has already passed the space's range checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Address {
    /// The numeric value of the address
    pub value: u64,
}

impl Address {
    /// Wrap a raw value without any range validation.
    ///
    /// Intended for stores and tests that already know the value is in
    /// range; loaders should derive addresses from an [`AddressSpace`].
    pub fn new(value: u64) -> Self {
        Self { value }
    }

    /// Add an offset, failing on u64 wrap-around.
    pub fn checked_add(&self, offset: u64) -> Option<Self> {
        self.value.checked_add(offset).map(Self::new)
    }

    /// Distance from a session base address.
    ///
    /// Returns `None` when this address lies below the base. Backfill uses
    /// this as its bounds guard: a region that drifted below the base must
    /// not produce a wrapped file offset.
    pub fn offset_from(&self, base: u64) -> Option<u64> {
        self.value.checked_sub(base)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.value)
    }
}

/// Errors raised while turning file-relative offsets into addresses.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// `base + offset` wrapped the 64-bit value domain.
    #[error("offset {offset:#x} overflows base address {base:#x}")]
    Overflow { base: u64, offset: u64 },
    /// The computed address is not representable in the space.
    #[error("address {value:#x} lies outside space `{space}` (max {max:#x})")]
    OutOfBounds {
        space: String,
        value: u64,
        max: u64,
    },
    /// The span's end address is not representable in the space.
    #[error("span {start} (+{size:#x} bytes) extends past space `{space}` (max {max:#x})")]
    SpanOutOfBounds {
        space: String,
        start: Address,
        size: u64,
        max: u64,
    },
}

/// A named addressing domain with a fixed word width.
///
/// The space is the arbiter of which offsets are mappable: every region
/// placement starts with [`AddressSpace::address_at`], which applies the
/// session base and rejects out-of-range or overflowing results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressSpace {
    /// The name of this address space
    pub name: String,
    /// Word width in bits (16, 32, or 64)
    pub bits: u8,
}

impl AddressSpace {
    /// Create a new AddressSpace.
    ///
    /// # Errors
    /// Returns an error if the name is empty or `bits` is not 16, 32, or 64.
    pub fn new(name: impl Into<String>, bits: u8) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("name cannot be empty or whitespace".to_string());
        }
        if ![16, 32, 64].contains(&bits) {
            return Err("bits must be 16, 32, or 64".to_string());
        }
        Ok(Self { name, bits })
    }

    /// The largest representable address in this space.
    pub fn max_address(&self) -> u64 {
        match self.bits {
            16 => 0xFFFF,
            32 => 0xFFFF_FFFF,
            _ => u64::MAX,
        }
    }

    /// Validate a raw value against the space bounds.
    pub fn address(&self, value: u64) -> Result<Address, AddressError> {
        if value > self.max_address() {
            return Err(AddressError::OutOfBounds {
                space: self.name.clone(),
                value,
                max: self.max_address(),
            });
        }
        Ok(Address::new(value))
    }

    /// Translate a file-relative offset into this space: `base + offset`,
    /// checked for wrap-around and range.
    pub fn address_at(&self, base: u64, offset: u64) -> Result<Address, AddressError> {
        let value = base
            .checked_add(offset)
            .ok_or(AddressError::Overflow { base, offset })?;
        self.address(value)
    }

    /// Check that `[start, start + size)` is fully representable.
    ///
    /// A zero-size span is accepted here; stores reject it separately.
    pub fn check_span(&self, start: Address, size: u64) -> Result<(), AddressError> {
        if size == 0 {
            return Ok(());
        }
        let last = start
            .value
            .checked_add(size - 1)
            .ok_or(AddressError::Overflow {
                base: start.value,
                offset: size - 1,
            })?;
        if last > self.max_address() {
            return Err(AddressError::SpanOutOfBounds {
                space: self.name.clone(),
                start,
                size,
                max: self.max_address(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-bit", self.name, self.bits)
    }
}

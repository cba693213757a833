//! Region type for modeled process memory.
//!
//! A region is a named, permissioned, contiguous span of address space.
//! Regions start life either initialized (backing bytes written at creation)
//! or uninitialized (bounds staked out, bytes to arrive later); stores track
//! which via [`RegionState`]. The metadata here never carries the backing
//! bytes themselves; those belong to the owning store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::address::Address;
use crate::core::perms::Perms;

/// Store-issued handle for a region.
///
/// Ids are local to one store and never reused within it. A name is *not*
/// an identity key (several live regions may share one), so everything that
/// must denote one region does it through the id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Whether a region's backing bytes exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionState {
    /// Bounds are reserved but no bytes are materialized.
    Uninitialized,
    /// Backing bytes exist and can be read and written.
    Initialized,
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionState::Uninitialized => write!(f, "uninitialized"),
            RegionState::Initialized => write!(f, "initialized"),
        }
    }
}

/// A named, permissioned, contiguous span of modeled address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Store-issued identity
    pub id: RegionId,
    /// Display name; mutable via the store (merge renames, last writer wins)
    pub name: String,
    /// First address of the span (inclusive)
    pub start: Address,
    /// Span length in bytes
    pub size: u64,
    /// Read/write/execute triple
    pub perms: Perms,
    /// Whether backing bytes have been materialized
    pub state: RegionState,
}

impl Region {
    /// End of the span (exclusive), or `None` when it would wrap u64.
    pub fn end(&self) -> Option<Address> {
        self.start.checked_add(self.size)
    }

    /// Check if an address falls inside the span.
    pub fn contains(&self, addr: Address) -> bool {
        addr.value >= self.start.value && (addr.value - self.start.value) < self.size
    }

    /// Whether backing bytes have been materialized.
    pub fn is_initialized(&self) -> bool {
        self.state == RegionState::Initialized
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| e.to_string())
    }

    /// Deserialize from JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, String> {
        serde_json::from_str(json_str).map_err(|e| e.to_string())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self
            .start
            .value
            .checked_add(self.size)
            .map(|e| format!("{:#x}", e))
            .unwrap_or_else(|| "<wrap>".to_string());
        write!(
            f,
            "{} [{}..{}) {} {}",
            self.name, self.start, end, self.perms, self.state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_region() -> Region {
        Region {
            id: RegionId(1),
            name: "text".to_string(),
            start: Address::new(0x8000_1000),
            size: 0x100,
            perms: Perms::RX,
            state: RegionState::Uninitialized,
        }
    }

    #[test]
    fn test_contains() {
        let r = text_region();
        assert!(r.contains(Address::new(0x8000_1000)));
        assert!(r.contains(Address::new(0x8000_10FF)));
        assert!(!r.contains(Address::new(0x8000_1100)));
        assert!(!r.contains(Address::new(0x8000_0FFF)));
    }

    #[test]
    fn test_end() {
        let r = text_region();
        assert_eq!(r.end(), Some(Address::new(0x8000_1100)));

        let mut wrapped = text_region();
        wrapped.start = Address::new(u64::MAX - 0x10);
        assert_eq!(wrapped.end(), None);
    }

    #[test]
    fn test_state() {
        let mut r = text_region();
        assert!(!r.is_initialized());
        r.state = RegionState::Initialized;
        assert!(r.is_initialized());
    }

    #[test]
    fn test_display() {
        let r = text_region();
        let s = r.to_string();
        assert!(s.contains("text"));
        assert!(s.contains("0x80001000"));
        assert!(s.contains("0x80001100"));
        assert!(s.contains("r-x"));
        assert!(s.contains("uninitialized"));
    }

    #[test]
    fn test_json_round_trip() {
        let r = text_region();
        let json_str = r.to_json().unwrap();
        let restored = Region::from_json(&json_str).unwrap();
        assert_eq!(r, restored);
    }
}

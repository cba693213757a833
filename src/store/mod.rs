//! Region stores: where modeled memory actually lives.
//!
//! The builder mutates a store only through the [`RegionStore`] trait; the
//! store is host-owned and may outlive any number of load sessions.
//! [`MemoryMap`] is the crate's in-memory implementation, keyed by start
//! address so containment lookups are a single predecessor query.

pub mod error;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::core::address::Address;
use crate::core::perms::Perms;
use crate::core::region::{Region, RegionId, RegionState};
use crate::monitor::LoadMonitor;
use crate::store::error::{Result, StoreError};

/// Chunk granularity for cancellable initialized-region copies (64 KiB).
pub const COPY_CHUNK: usize = 64 * 1024;

/// Mutable region storage as seen by a load session.
///
/// Implementations own region identity and backing bytes. Every method is
/// synchronous; callers hold the store exclusively for the session, so no
/// internal locking is expected (a host-side lock is modeled as the
/// [`StoreError::Locked`] refusal).
pub trait RegionStore {
    /// Create a region whose backing bytes are `data`, copied eagerly.
    ///
    /// The copy runs chunk-wise and observes `monitor` between chunks; a
    /// cancelled copy fails with [`StoreError::Cancelled`] and leaves the
    /// store unchanged. Fails with [`StoreError::Conflict`] when the span
    /// overlaps any existing region.
    fn create_initialized(
        &mut self,
        name: &str,
        start: Address,
        data: &[u8],
        perms: Perms,
        monitor: &LoadMonitor,
    ) -> Result<RegionId>;

    /// Create a region with reserved bounds and no backing bytes.
    fn create_uninitialized(
        &mut self,
        name: &str,
        start: Address,
        size: u64,
        perms: Perms,
    ) -> Result<RegionId>;

    /// The region containing `addr`, if any.
    fn find_containing(&self, addr: Address) -> Option<RegionId>;

    /// Materialize backing bytes for an uninitialized region, filled with
    /// `fill`. Converting an already-initialized region is a no-op.
    fn convert_to_initialized(&mut self, id: RegionId, fill: u8) -> Result<()>;

    /// Overwrite `bytes` starting at `at`. The whole range must fall inside
    /// the region and the region must be initialized; nothing is written
    /// otherwise.
    fn write_bytes(&mut self, id: RegionId, at: Address, bytes: &[u8]) -> Result<()>;

    /// Read `len` bytes starting at `at` from an initialized region.
    fn read_bytes(&self, id: RegionId, at: Address, len: u64) -> Result<Vec<u8>>;

    /// Change a region's display name. Names are not unique; last writer
    /// wins and no other region is affected.
    fn rename(&mut self, id: RegionId, name: &str) -> Result<()>;

    /// Metadata for a region, if it exists.
    fn region(&self, id: RegionId) -> Option<&Region>;

    /// Snapshot of all region ids in ascending address order.
    fn region_ids(&self) -> Vec<RegionId>;
}

/// Resource bounds for a [`MemoryMap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLimits {
    /// Maximum number of live regions.
    pub max_regions: usize,
    /// Maximum sum of region span sizes in bytes.
    pub max_total_bytes: u64,
}

impl Default for MapLimits {
    fn default() -> Self {
        Self {
            max_regions: 4096,
            max_total_bytes: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

struct Slot {
    meta: Region,
    /// Backing bytes; `None` until the region is initialized.
    data: Option<Vec<u8>>,
}

/// In-memory region store.
///
/// Regions are indexed by start address (BTreeMap) for containment lookup
/// and by id for direct access. Creation enforces non-overlap, non-zero
/// size, and the configured [`MapLimits`].
pub struct MemoryMap {
    slots: BTreeMap<u64, Slot>,
    index: HashMap<RegionId, u64>,
    next_id: u64,
    limits: MapLimits,
    total_bytes: u64,
    locked: bool,
}

impl MemoryMap {
    /// Create an empty map with default limits.
    pub fn new() -> Self {
        Self::with_limits(MapLimits::default())
    }

    /// Create an empty map with explicit limits.
    pub fn with_limits(limits: MapLimits) -> Self {
        Self {
            slots: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 0,
            limits,
            total_bytes: 0,
            locked: false,
        }
    }

    /// Number of live regions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the map holds no regions.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sum of region span sizes in bytes (initialized or not).
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// The limits this map enforces.
    pub fn limits(&self) -> &MapLimits {
        &self.limits
    }

    /// Model the host taking or releasing its lock on the backing store.
    /// While locked, every mutating operation fails with
    /// [`StoreError::Locked`]; reads stay available.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Whether the host currently holds the store locked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// All regions in ascending address order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.slots.values().map(|slot| &slot.meta)
    }

    fn slot(&self, id: RegionId) -> Result<&Slot> {
        self.index
            .get(&id)
            .and_then(|start| self.slots.get(start))
            .ok_or(StoreError::UnknownRegion(id))
    }

    fn slot_mut(&mut self, id: RegionId) -> Result<&mut Slot> {
        let start = *self.index.get(&id).ok_or(StoreError::UnknownRegion(id))?;
        self.slots
            .get_mut(&start)
            .ok_or(StoreError::UnknownRegion(id))
    }

    /// Validate a prospective span and return its last byte address.
    fn validate_new(&self, name: &str, start: Address, size: u64) -> Result<u64> {
        if self.locked {
            return Err(StoreError::Locked);
        }
        if size == 0 {
            return Err(StoreError::EmptyRegion(name.to_string()));
        }
        // Last-byte arithmetic keeps spans ending exactly at the top of the
        // 64-bit domain representable.
        let last = start
            .value
            .checked_add(size - 1)
            .ok_or_else(|| StoreError::SpanOverflow {
                name: name.to_string(),
                start,
                size,
            })?;

        if let Some((_, prev)) = self.slots.range(..=start.value).next_back() {
            // Stored spans already passed this validation, so size >= 1 and
            // the last byte fits in u64 even for spans ending at the top of
            // the domain.
            let prev_last = prev.meta.start.value + (prev.meta.size - 1);
            if prev_last >= start.value {
                warn!(
                    name = name,
                    start = %start,
                    size = size,
                    existing = %prev.meta.name,
                    "region span conflicts with existing region"
                );
                return Err(StoreError::Conflict {
                    name: name.to_string(),
                    start,
                    size,
                    existing: prev.meta.name.clone(),
                });
            }
        }
        if let Some((_, next)) = self.slots.range(start.value..).next() {
            if next.meta.start.value <= last {
                warn!(
                    name = name,
                    start = %start,
                    size = size,
                    existing = %next.meta.name,
                    "region span conflicts with existing region"
                );
                return Err(StoreError::Conflict {
                    name: name.to_string(),
                    start,
                    size,
                    existing: next.meta.name.clone(),
                });
            }
        }

        if self.slots.len() >= self.limits.max_regions {
            return Err(StoreError::LimitExceeded(format!(
                "{} regions",
                self.limits.max_regions
            )));
        }
        if self.total_bytes.saturating_add(size) > self.limits.max_total_bytes {
            return Err(StoreError::LimitExceeded(format!(
                "{:#x} total bytes",
                self.limits.max_total_bytes
            )));
        }
        Ok(last)
    }

    fn insert_slot(
        &mut self,
        name: &str,
        start: Address,
        size: u64,
        perms: Perms,
        data: Option<Vec<u8>>,
    ) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        let state = if data.is_some() {
            RegionState::Initialized
        } else {
            RegionState::Uninitialized
        };
        let meta = Region {
            id,
            name: name.to_string(),
            start,
            size,
            perms,
            state,
        };
        debug!(region = %meta, "created region");
        self.index.insert(id, start.value);
        self.slots.insert(start.value, Slot { meta, data });
        self.total_bytes = self.total_bytes.saturating_add(size);
        id
    }
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionStore for MemoryMap {
    fn create_initialized(
        &mut self,
        name: &str,
        start: Address,
        data: &[u8],
        perms: Perms,
        monitor: &LoadMonitor,
    ) -> Result<RegionId> {
        let size = data.len() as u64;
        self.validate_new(name, start, size)?;

        let mut backing = vec![0u8; data.len()];
        let mut copied = 0usize;
        for chunk in data.chunks(COPY_CHUNK) {
            if monitor.is_cancelled() {
                warn!(
                    region = name,
                    copied = copied,
                    total = data.len(),
                    "initialized-region copy cancelled"
                );
                return Err(StoreError::Cancelled {
                    region: name.to_string(),
                    copied: copied as u64,
                });
            }
            backing[copied..copied + chunk.len()].copy_from_slice(chunk);
            copied += chunk.len();
        }

        Ok(self.insert_slot(name, start, size, perms, Some(backing)))
    }

    fn create_uninitialized(
        &mut self,
        name: &str,
        start: Address,
        size: u64,
        perms: Perms,
    ) -> Result<RegionId> {
        self.validate_new(name, start, size)?;
        Ok(self.insert_slot(name, start, size, perms, None))
    }

    fn find_containing(&self, addr: Address) -> Option<RegionId> {
        self.slots
            .range(..=addr.value)
            .next_back()
            .filter(|(_, slot)| slot.meta.contains(addr))
            .map(|(_, slot)| slot.meta.id)
    }

    fn convert_to_initialized(&mut self, id: RegionId, fill: u8) -> Result<()> {
        if self.locked {
            return Err(StoreError::Locked);
        }
        let slot = self.slot_mut(id)?;
        if slot.meta.state == RegionState::Initialized {
            return Ok(());
        }
        slot.data = Some(vec![fill; slot.meta.size as usize]);
        slot.meta.state = RegionState::Initialized;
        debug!(region = %slot.meta.name, size = slot.meta.size, fill = fill, "converted region to initialized");
        Ok(())
    }

    fn write_bytes(&mut self, id: RegionId, at: Address, bytes: &[u8]) -> Result<()> {
        if self.locked {
            return Err(StoreError::Locked);
        }
        let slot = self.slot_mut(id)?;
        let len = bytes.len() as u64;
        let rel = at
            .value
            .checked_sub(slot.meta.start.value)
            .filter(|rel| rel.saturating_add(len) <= slot.meta.size)
            .ok_or_else(|| StoreError::Access {
                region: slot.meta.name.clone(),
                addr: at,
                len,
            })?;
        let data = slot.data.as_mut().ok_or_else(|| StoreError::Uninitialized {
            region: slot.meta.name.clone(),
        })?;
        data[rel as usize..rel as usize + bytes.len()].copy_from_slice(bytes);
        trace!(region = %slot.meta.name, at = %at, len = len, "wrote bytes");
        Ok(())
    }

    fn read_bytes(&self, id: RegionId, at: Address, len: u64) -> Result<Vec<u8>> {
        let slot = self.slot(id)?;
        let rel = at
            .value
            .checked_sub(slot.meta.start.value)
            .filter(|rel| rel.saturating_add(len) <= slot.meta.size)
            .ok_or_else(|| StoreError::Access {
                region: slot.meta.name.clone(),
                addr: at,
                len,
            })?;
        let data = slot.data.as_ref().ok_or_else(|| StoreError::Uninitialized {
            region: slot.meta.name.clone(),
        })?;
        trace!(region = %slot.meta.name, at = %at, len = len, "read bytes");
        Ok(data[rel as usize..rel as usize + len as usize].to_vec())
    }

    fn rename(&mut self, id: RegionId, name: &str) -> Result<()> {
        if self.locked {
            return Err(StoreError::Locked);
        }
        let slot = self.slot_mut(id)?;
        debug!(from = %slot.meta.name, to = name, "renamed region");
        slot.meta.name = name.to_string();
        Ok(())
    }

    fn region(&self, id: RegionId) -> Option<&Region> {
        self.slot(id).ok().map(|slot| &slot.meta)
    }

    fn region_ids(&self) -> Vec<RegionId> {
        self.slots.values().map(|slot| slot.meta.id).collect()
    }
}

impl fmt::Display for MemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lock = if self.locked { " (locked)" } else { "" };
        writeln!(
            f,
            "memory map: {} region(s), {:#x} bytes{}",
            self.slots.len(),
            self.total_bytes,
            lock
        )?;
        for slot in self.slots.values() {
            writeln!(f, "  {}", slot.meta)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(value: u64) -> Address {
        Address::new(value)
    }

    fn map_with_region(state: RegionState) -> (MemoryMap, RegionId) {
        let mut map = MemoryMap::new();
        let id = match state {
            RegionState::Initialized => map
                .create_initialized(
                    "seed",
                    addr(0x1000),
                    &[0u8; 0x100],
                    Perms::RW,
                    &LoadMonitor::new(),
                )
                .unwrap(),
            RegionState::Uninitialized => map
                .create_uninitialized("seed", addr(0x1000), 0x100, Perms::RW)
                .unwrap(),
        };
        (map, id)
    }

    #[test]
    fn create_and_read_back() {
        let mut map = MemoryMap::new();
        let data: Vec<u8> = (0u8..16).collect();
        let id = map
            .create_initialized("text", addr(0x4000), &data, Perms::RX, &LoadMonitor::new())
            .unwrap();
        assert_eq!(map.read_bytes(id, addr(0x4000), 16).unwrap(), data);
        assert_eq!(map.read_bytes(id, addr(0x4008), 4).unwrap(), &data[8..12]);
        let meta = map.region(id).unwrap();
        assert_eq!(meta.name, "text");
        assert!(meta.is_initialized());
    }

    #[test]
    fn overlap_rejected() {
        let (mut map, _) = map_with_region(RegionState::Uninitialized);
        // overlapping the tail of [0x1000, 0x1100)
        let err = map
            .create_uninitialized("late", addr(0x10FF), 0x10, Perms::R)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref existing, .. } if existing == "seed"));
        // overlapping from below
        let err = map
            .create_uninitialized("early", addr(0xF00), 0x200, Perms::R)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn adjacent_regions_allowed() {
        let (mut map, _) = map_with_region(RegionState::Uninitialized);
        assert!(map
            .create_uninitialized("below", addr(0xF00), 0x100, Perms::R)
            .is_ok());
        assert!(map
            .create_uninitialized("above", addr(0x1100), 0x100, Perms::R)
            .is_ok());
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn zero_size_rejected() {
        let mut map = MemoryMap::new();
        let err = map
            .create_uninitialized("empty", addr(0x1000), 0, Perms::R)
            .unwrap_err();
        assert_eq!(err, StoreError::EmptyRegion("empty".to_string()));
    }

    #[test]
    fn span_wrap_rejected() {
        let mut map = MemoryMap::new();
        let err = map
            .create_uninitialized("wrap", addr(u64::MAX - 1), 0x10, Perms::R)
            .unwrap_err();
        assert!(matches!(err, StoreError::SpanOverflow { .. }));
    }

    #[test]
    fn span_to_top_of_domain_allowed() {
        let mut map = MemoryMap::new();
        assert!(map
            .create_uninitialized("top", addr(u64::MAX - 0xF), 0x10, Perms::R)
            .is_ok());
    }

    #[test]
    fn conflict_detected_against_domain_top_region() {
        let mut map = MemoryMap::new();
        map.create_uninitialized("top", addr(u64::MAX - 0xF), 0x10, Perms::R)
            .unwrap();
        // overlap check runs against a span whose last byte is u64::MAX
        let err = map
            .create_uninitialized("clash", addr(u64::MAX - 0x7), 0x8, Perms::R)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { ref existing, .. } if existing == "top"));
        // and an adjacent span below it still fits
        assert!(map
            .create_uninitialized("below", addr(u64::MAX - 0x1F), 0x10, Perms::R)
            .is_ok());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn convert_is_idempotent() {
        let (mut map, id) = map_with_region(RegionState::Uninitialized);
        map.convert_to_initialized(id, 0).unwrap();
        map.write_bytes(id, addr(0x1000), &[0xAA, 0xBB]).unwrap();
        // second conversion must not clobber written bytes
        map.convert_to_initialized(id, 0).unwrap();
        assert_eq!(map.read_bytes(id, addr(0x1000), 2).unwrap(), [0xAA, 0xBB]);
    }

    #[test]
    fn convert_applies_fill() {
        let (mut map, id) = map_with_region(RegionState::Uninitialized);
        map.convert_to_initialized(id, 0xCC).unwrap();
        assert_eq!(
            map.read_bytes(id, addr(0x1000), 4).unwrap(),
            [0xCC, 0xCC, 0xCC, 0xCC]
        );
    }

    #[test]
    fn write_requires_backing() {
        let (mut map, id) = map_with_region(RegionState::Uninitialized);
        let err = map.write_bytes(id, addr(0x1000), &[1]).unwrap_err();
        assert_eq!(
            err,
            StoreError::Uninitialized {
                region: "seed".to_string()
            }
        );
    }

    #[test]
    fn write_out_of_bounds() {
        let (mut map, id) = map_with_region(RegionState::Initialized);
        // starts inside, runs past the end
        let err = map.write_bytes(id, addr(0x10F0), &[0u8; 0x20]).unwrap_err();
        assert!(matches!(err, StoreError::Access { .. }));
        // starts below the region
        let err = map.write_bytes(id, addr(0xFFF), &[0u8; 2]).unwrap_err();
        assert!(matches!(err, StoreError::Access { .. }));
    }

    #[test]
    fn rename_applies() {
        let (mut map, id) = map_with_region(RegionState::Uninitialized);
        map.rename(id, "renamed").unwrap();
        assert_eq!(map.region(id).unwrap().name, "renamed");
    }

    #[test]
    fn duplicate_names_allowed() {
        let (mut map, _) = map_with_region(RegionState::Uninitialized);
        assert!(map
            .create_uninitialized("seed", addr(0x9000), 0x10, Perms::R)
            .is_ok());
        let names: Vec<_> = map.regions().map(|r| r.name.clone()).collect();
        assert_eq!(names, ["seed", "seed"]);
    }

    #[test]
    fn find_containing_hits_and_misses() {
        let (map, id) = map_with_region(RegionState::Uninitialized);
        assert_eq!(map.find_containing(addr(0x1000)), Some(id));
        assert_eq!(map.find_containing(addr(0x10FF)), Some(id));
        assert_eq!(map.find_containing(addr(0x1100)), None);
        assert_eq!(map.find_containing(addr(0xFFF)), None);
        assert_eq!(map.find_containing(addr(0)), None);
    }

    #[test]
    fn locked_map_refuses_mutation() {
        let (mut map, id) = map_with_region(RegionState::Initialized);
        map.set_locked(true);
        assert_eq!(
            map.create_uninitialized("x", addr(0x9000), 0x10, Perms::R),
            Err(StoreError::Locked)
        );
        assert_eq!(map.write_bytes(id, addr(0x1000), &[1]), Err(StoreError::Locked));
        assert_eq!(map.rename(id, "y"), Err(StoreError::Locked));
        assert_eq!(map.convert_to_initialized(id, 0), Err(StoreError::Locked));
        // reads stay available
        assert!(map.read_bytes(id, addr(0x1000), 1).is_ok());
        map.set_locked(false);
        assert!(map.rename(id, "y").is_ok());
    }

    #[test]
    fn limits_enforced() {
        let mut map = MemoryMap::with_limits(MapLimits {
            max_regions: 1,
            max_total_bytes: 0x100,
        });
        map.create_uninitialized("one", addr(0x0), 0x80, Perms::R)
            .unwrap();
        let err = map
            .create_uninitialized("two", addr(0x1000), 0x10, Perms::R)
            .unwrap_err();
        assert!(matches!(err, StoreError::LimitExceeded(_)));

        let mut map = MemoryMap::with_limits(MapLimits {
            max_regions: 16,
            max_total_bytes: 0x100,
        });
        map.create_uninitialized("one", addr(0x0), 0x80, Perms::R)
            .unwrap();
        let err = map
            .create_uninitialized("two", addr(0x1000), 0x81, Perms::R)
            .unwrap_err();
        assert!(matches!(err, StoreError::LimitExceeded(_)));
    }

    #[test]
    fn total_bytes_saturates_at_full_domain() {
        let mut map = MemoryMap::with_limits(MapLimits {
            max_regions: 16,
            max_total_bytes: u64::MAX,
        });
        let half = 1u64 << 63;
        map.create_uninitialized("low", addr(0x0), half, Perms::R)
            .unwrap();
        map.create_uninitialized("high", addr(half), half, Perms::R)
            .unwrap();
        // two halves sum past what u64 can count; the tally pegs at the max
        assert_eq!(map.total_bytes(), u64::MAX);
    }

    #[test]
    fn cancelled_copy_creates_nothing() {
        let mut map = MemoryMap::new();
        let monitor = LoadMonitor::new();
        monitor.cancel();
        let err = map
            .create_initialized("text", addr(0x1000), &[0u8; 32], Perms::RX, &monitor)
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled { .. }));
        assert!(map.is_empty());
    }

    #[test]
    fn region_ids_in_address_order() {
        let mut map = MemoryMap::new();
        let hi = map
            .create_uninitialized("hi", addr(0x9000), 0x10, Perms::R)
            .unwrap();
        let lo = map
            .create_uninitialized("lo", addr(0x1000), 0x10, Perms::R)
            .unwrap();
        assert_eq!(map.region_ids(), vec![lo, hi]);
    }

    #[test]
    fn display_summary() {
        let (map, _) = map_with_region(RegionState::Uninitialized);
        let text = map.to_string();
        assert!(text.contains("1 region"));
        assert!(text.contains("seed"));
    }
}

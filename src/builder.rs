//! Region builder: the stateful core of a load session.
//!
//! `RegionBuilder` drives one session of carving a program image into
//! regions of a [`RegionStore`]. Sections whose bytes are known up front go
//! in eagerly; sections that may be overwritten or relocated during the rest
//! of the load are declared uninitialized and backfilled from the
//! [`ByteSource`] at the end. Late-discovered byte ranges merge into
//! whatever region already claims their address.
//!
//! The creation paths are deliberately asymmetric about failure: the
//! uninitialized/deferred paths log and skip (an optional section must not
//! abort the whole load), while the eager path and merge propagate address
//! errors to the caller.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::address::{Address, AddressError, AddressSpace};
use crate::core::perms::Perms;
use crate::core::region::RegionId;
use crate::monitor::LoadMonitor;
use crate::source::error::SourceError;
use crate::source::ByteSource;
use crate::span_trace;
use crate::store::error::StoreError;
use crate::store::RegionStore;

/// Fill byte used when materializing backing for a declared region.
pub const ZERO_FILL: u8 = 0;

/// Errors returned by the strict creation and merge paths.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single region could not be backfilled. Backfill failures surface
/// through logs only, so this type stays internal.
#[derive(Debug, Error)]
enum BackfillError {
    #[error("region start {start} lies below session base {base:#x}")]
    BelowBase { start: Address, base: u64 },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One load session over a store, a source image, and a base address.
///
/// The builder borrows the store mutably for the whole session; exclusive
/// access is the borrow checker's guarantee, not a lock's. Region names
/// declared through [`create_deferred`](RegionBuilder::create_deferred) are
/// remembered in a pending set and backfilled from the source by
/// [`finalize_all`](RegionBuilder::finalize_all).
pub struct RegionBuilder<'a, S: RegionStore, B: ByteSource> {
    store: &'a mut S,
    source: &'a B,
    space: AddressSpace,
    base: u64,
    monitor: LoadMonitor,
    /// Names awaiting backfill, in declaration order. Never drained:
    /// finalize filters the store against it, so finalizing twice is safe.
    pending: Vec<String>,
}

impl<'a, S: RegionStore, B: ByteSource> RegionBuilder<'a, S, B> {
    pub fn new(
        store: &'a mut S,
        source: &'a B,
        space: AddressSpace,
        base: u64,
        monitor: LoadMonitor,
    ) -> Self {
        debug!(space = %space, base = base, "starting load session");
        Self {
            store,
            source,
            space,
            base,
            monitor,
            pending: Vec::new(),
        }
    }

    /// The session base address applied to every section offset.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// The addressing domain regions are placed in.
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// Region names awaiting backfill, in declaration order.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Translate a section offset into a placed, span-checked start address.
    fn place(&self, offset: u64, size: u64) -> Result<Address, AddressError> {
        let start = self.space.address_at(self.base, offset)?;
        self.space.check_span(start, size)?;
        Ok(start)
    }

    /// Declare a region with reserved bounds and no contents.
    ///
    /// This is the lenient primitive: address errors and store refusals are
    /// logged and collapse to `None`, and the load continues without the
    /// region. The pending set is not touched.
    pub fn create_uninitialized(
        &mut self,
        name: &str,
        offset: u64,
        size: u64,
        perms: Perms,
    ) -> Option<RegionId> {
        let start = match self.place(offset, size) {
            Ok(start) => start,
            Err(err) => {
                warn!(
                    region = name,
                    offset = offset,
                    size = size,
                    error = %err,
                    "skipping region: offset not mappable"
                );
                return None;
            }
        };
        match self.store.create_uninitialized(name, start, size, perms) {
            Ok(id) => {
                debug!(region = name, start = %start, size = size, "declared uninitialized region");
                Some(id)
            }
            Err(err) => {
                warn!(region = name, start = %start, size = size, error = %err, "skipping region: store refused");
                None
            }
        }
    }

    /// Declare a region now and remember its name for backfill.
    ///
    /// Same lenient contract as
    /// [`create_uninitialized`](RegionBuilder::create_uninitialized); on
    /// success the name joins the pending set (once, even if several
    /// regions share it).
    pub fn create_deferred(
        &mut self,
        name: &str,
        offset: u64,
        size: u64,
        perms: Perms,
    ) -> Option<RegionId> {
        let id = self.create_uninitialized(name, offset, size, perms)?;
        if !self.pending.iter().any(|n| n == name) {
            self.pending.push(name.to_string());
        }
        Some(id)
    }

    /// Declare a region that has no image backing at all (RAM, MMIO
    /// scratch). Never backfilled; the handle is not needed.
    pub fn create_unbacked(&mut self, name: &str, offset: u64, size: u64, perms: Perms) {
        let _ = self.create_uninitialized(name, offset, size, perms);
    }

    /// Create a region and copy `data` in eagerly.
    ///
    /// The strict path: address errors and store refusals are returned, not
    /// swallowed. On success the region reads back exactly `data`.
    pub fn create_initialized(
        &mut self,
        name: &str,
        offset: u64,
        data: &[u8],
        perms: Perms,
    ) -> Result<RegionId, BuildError> {
        let size = data.len() as u64;
        let start = self.place(offset, size)?;
        let id = self
            .store
            .create_initialized(name, start, data, perms, &self.monitor)?;
        debug!(region = name, start = %start, size = size, "created initialized region");
        Ok(id)
    }

    /// Merge a late-discovered byte range into whatever region claims its
    /// address.
    ///
    /// With no region at the target address the range becomes a fresh
    /// initialized region with full `rwx` permissions, under the eager
    /// path's error contract. Onto an existing region the bytes are
    /// overlaid (materializing zero-filled backing first if needed) and the
    /// region takes `name`; store faults during that overlay are logged,
    /// the call still returns `Ok(())`, and the region keeps whatever was
    /// last written.
    pub fn merge(&mut self, name: &str, offset: u64, data: &[u8]) -> Result<(), BuildError> {
        let size = data.len() as u64;
        let target = self.place(offset, size)?;

        let Some(id) = self.store.find_containing(target) else {
            self.create_initialized(name, offset, data, Perms::RWX)?;
            return Ok(());
        };

        match self.merge_into(id, target, data, name) {
            Ok(()) => {
                info!(region = name, start = %target, size = size, "merged bytes into existing region");
            }
            Err(err) => {
                error!(region = name, start = %target, size = size, error = %err, "merge overlay failed");
            }
        }
        Ok(())
    }

    fn merge_into(
        &mut self,
        id: RegionId,
        at: Address,
        data: &[u8],
        name: &str,
    ) -> Result<(), StoreError> {
        self.store.convert_to_initialized(id, ZERO_FILL)?;
        self.store.write_bytes(id, at, data)?;
        self.store.rename(id, name)
    }

    /// Copy a region's bytes out of the source image, converting first so a
    /// region that fails mid-way is left zero-filled rather than unbacked.
    fn backfill(&mut self, id: RegionId) -> Result<(), BackfillError> {
        let (start, size) = match self.store.region(id) {
            Some(region) => (region.start, region.size),
            None => return Err(BackfillError::Store(StoreError::UnknownRegion(id))),
        };
        let file_offset = start
            .offset_from(self.base)
            .ok_or(BackfillError::BelowBase {
                start,
                base: self.base,
            })?;
        self.store.convert_to_initialized(id, ZERO_FILL)?;
        let data = self.source.read_at(file_offset, size)?;
        self.store.write_bytes(id, start, &data)?;
        Ok(())
    }

    fn backfill_each(&mut self, ids: Vec<RegionId>) -> usize {
        let mut done = 0;
        for id in ids {
            let label = self
                .store
                .region(id)
                .map(|region| region.name.clone())
                .unwrap_or_else(|| id.to_string());
            match self.backfill(id) {
                Ok(()) => {
                    debug!(region = %label, "backfilled region from image");
                    done += 1;
                }
                Err(err) => {
                    error!(region = %label, error = %err, "backfill failed; region left as last written");
                }
            }
        }
        done
    }

    /// Backfill every region currently named `name`, pending or not.
    ///
    /// Returns how many regions were backfilled successfully; failures are
    /// logged per region and do not stop the scan.
    pub fn finalize_region(&mut self, name: &str) -> usize {
        info!(region = name, "finalizing regions by name");
        let ids: Vec<RegionId> = self
            .store
            .region_ids()
            .into_iter()
            .filter(|id| {
                self.store
                    .region(*id)
                    .map_or(false, |region| region.name == name)
            })
            .collect();
        self.backfill_each(ids)
    }

    /// Backfill every region whose current name is in the pending set: the
    /// normal end-of-load pass.
    ///
    /// The pending set itself is never drained, so calling this again
    /// re-reads the same deterministic bytes. A region renamed since its
    /// deferred declaration (for example by [`merge`](RegionBuilder::merge))
    /// no longer matches and is left alone. Returns the number of regions
    /// backfilled successfully.
    pub fn finalize_all(&mut self) -> usize {
        let span = span_trace!("finalize_all", pending = self.pending.len());
        let _guard = span.enter();

        let ids: Vec<RegionId> = self
            .store
            .region_ids()
            .into_iter()
            .filter(|id| {
                self.store
                    .region(*id)
                    .map_or(false, |region| self.pending.iter().any(|n| *n == region.name))
            })
            .collect();
        let done = self.backfill_each(ids);
        info!(backfilled = done, pending = self.pending.len(), "finalize pass complete");
        done
    }
}

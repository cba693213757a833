//! Permission triple for memory regions.
//!
//! Regions carry a read/write/execute triple packed into raw bits, displayed
//! in the conventional `rwx` form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Permission flags for memory regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Perms {
    /// Raw permission bits: read=1, write=2, execute=4
    pub bits: u8,
}

impl Perms {
    /// Read-only, the usual shape for tables backfilled from the image.
    pub const R: Perms = Perms { bits: 1 };
    /// Read/write data.
    pub const RW: Perms = Perms { bits: 1 | 2 };
    /// Read/execute code.
    pub const RX: Perms = Perms { bits: 1 | 4 };
    /// Fully permissive; merge uses this for freshly conjured regions.
    pub const RWX: Perms = Perms { bits: 1 | 2 | 4 };

    /// Create a new Perms instance
    pub fn new(read: bool, write: bool, execute: bool) -> Self {
        let mut bits = 0u8;
        if read {
            bits |= 1;
        }
        if write {
            bits |= 2;
        }
        if execute {
            bits |= 4;
        }
        Self { bits }
    }

    /// Check if the region has read permission
    pub fn has_read(&self) -> bool {
        (self.bits & 1) != 0
    }

    /// Check if the region has write permission
    pub fn has_write(&self) -> bool {
        (self.bits & 2) != 0
    }

    /// Check if the region has execute permission
    pub fn has_execute(&self) -> bool {
        (self.bits & 4) != 0
    }

    /// Check if the region is readable and writable (data region)
    pub fn is_data(&self) -> bool {
        self.has_read() && self.has_write() && !self.has_execute()
    }

    /// Check if the region is readable and executable (code region)
    pub fn is_code(&self) -> bool {
        self.has_read() && self.has_execute() && !self.has_write()
    }

    /// Check if the region is read-only
    pub fn is_readonly(&self) -> bool {
        self.has_read() && !self.has_write() && !self.has_execute()
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut perms = String::new();
        perms.push(if self.has_read() { 'r' } else { '-' });
        perms.push(if self.has_write() { 'w' } else { '-' });
        perms.push(if self.has_execute() { 'x' } else { '-' });
        write!(f, "{}", perms)
    }
}

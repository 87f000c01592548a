//! # Memory Types
//!
//! Primitive types shared by the address-space simulation and the
//! cross-address-space accessors.
//!
//! ## Key Types
//!
//! - [`MemoryPerms`]: Permission flags for mapped pages
//! - [`AccessKind`]: Whether an access reads or writes
//! - [`AccessError`]: Why an access to a foreign address space was refused

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Size of one page in bytes
pub const PAGE_SIZE: u64 = 4096;

/// Rounds an address down to the start of its page
pub const fn page_base(address: u64) -> u64 {
    address & !(PAGE_SIZE - 1)
}

/// Returns the offset of an address within its page
pub const fn page_offset(address: u64) -> u64 {
    address & (PAGE_SIZE - 1)
}

/// Returns true if `[address, address + length)` touches more than one page
pub fn straddles_page(address: u64, length: u64) -> bool {
    length > 0 && page_offset(address) + length > PAGE_SIZE
}

/// Memory permission flags
///
/// Permissions follow the principle of least privilege.
/// By default, no permissions are granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MemoryPerms {
    pub read: bool,
    pub write: bool,
}

impl MemoryPerms {
    /// No permissions
    pub const fn none() -> Self {
        Self {
            read: false,
            write: false,
        }
    }

    /// Read-only permission
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    /// Read and write permissions
    pub const fn read_write() -> Self {
        Self {
            read: true,
            write: true,
        }
    }

    /// Checks whether an access of the given kind is permitted
    pub fn allows(&self, access: AccessKind) -> bool {
        match access {
            AccessKind::Read => self.read,
            AccessKind::Write => self.write,
        }
    }
}

impl fmt::Display for MemoryPerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            if self.read { "R" } else { "-" },
            if self.write { "W" } else { "-" }
        )
    }
}

/// Kind of memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// Errors from address space and accessor operations
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessError {
    #[error("Address {address:#x} is not mapped")]
    Unmapped { address: u64 },

    #[error("Permission denied: {access} at {address:#x}")]
    PermissionDenied { address: u64, access: AccessKind },

    #[error("Address {address:#x} is not aligned to {align} bytes")]
    Misaligned { address: u64, align: u64 },

    #[error("Page at {address:#x} is already mapped")]
    AlreadyMapped { address: u64 },

    #[error("Object of {size} bytes does not fit in a page")]
    TooLarge { size: u64 },

    #[error("Address range overflows the address space")]
    RangeOverflow,
}

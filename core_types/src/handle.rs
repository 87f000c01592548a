//! Capability handles
//!
//! A [`Handle`] is the small integer a process uses to name one entry of its
//! universe (handle table). Handles are not pointers: they encode a slot
//! index and a generation counter, so a handle that outlives its slot is
//! detected instead of silently naming whatever object reuses the slot.
//!
//! ## Layout
//!
//! ```text
//!  63            32 31             0
//! +----------------+----------------+
//! |   generation   |  slot index+1  |
//! +----------------+----------------+
//! ```
//!
//! The all-zero value is the null sentinel and never names a live entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A handle into a universe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(i64);

impl Handle {
    /// The null sentinel
    pub const NULL: Handle = Handle(0);

    /// Builds a handle from a slot index and generation
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self(((generation as i64) << 32) | (index as i64 + 1))
    }

    /// Reinterprets a raw integer as a handle
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer
    pub const fn as_raw(&self) -> i64 {
        self.0
    }

    /// Returns true for the null sentinel
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns the slot index, or `None` for the null sentinel
    pub fn index(&self) -> Option<u32> {
        let low = (self.0 as u64 & 0xFFFF_FFFF) as u32;
        low.checked_sub(1)
    }

    /// Returns the generation counter
    pub fn generation(&self) -> u32 {
        ((self.0 as u64) >> 32) as u32
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "Handle(null)");
        }
        match self.index() {
            Some(index) => write!(f, "Handle({}@{})", index, self.generation()),
            None => write!(f, "Handle(raw {:#x})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(Handle::NULL.is_null());
        assert_eq!(Handle::NULL.index(), None);
        assert_eq!(Handle::default(), Handle::NULL);
    }

    #[test]
    fn test_parts_roundtrip() {
        let handle = Handle::from_parts(5, 3);
        assert!(!handle.is_null());
        assert_eq!(handle.index(), Some(5));
        assert_eq!(handle.generation(), 3);
    }

    #[test]
    fn test_slot_zero_is_not_null() {
        let handle = Handle::from_parts(0, 0);
        assert!(!handle.is_null());
        assert_eq!(handle.index(), Some(0));
    }

    #[test]
    fn test_generations_distinguish_reuse() {
        let first = Handle::from_parts(2, 1);
        let second = Handle::from_parts(2, 2);
        assert_ne!(first, second);
        assert_eq!(first.index(), second.index());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Handle::NULL), "Handle(null)");
        assert_eq!(format!("{}", Handle::from_parts(4, 9)), "Handle(4@9)");
    }
}

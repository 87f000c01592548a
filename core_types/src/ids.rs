//! Unique identifiers for kernel entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a process
///
/// A process owns exactly one universe (handle table) and one address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Creates a new random process ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a process ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process({})", self.0)
    }
}

/// Unique identifier for a thread
///
/// Threads are the units that submit action chains and get suspended
/// while waiting for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(Uuid);

impl ThreadId {
    /// Creates a new random thread ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a thread ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Unique identifier for a stream (a pair of lanes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Creates a new random stream ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

/// Identifier for an address space
///
/// Address space IDs are allocated in increasing order by the kernel. The
/// ordering is load-bearing: code that locks two spaces at once always
/// locks the smaller ID first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AddressSpaceId(u64);

impl AddressSpaceId {
    /// Creates an address space ID from its raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AddressSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aspace:{}", self.0)
    }
}

/// Identifier for one submitted action chain
///
/// Chain IDs are handed out in submission order, kernel-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(u64);

impl ChainId {
    /// Creates a chain ID from its raw value
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value
    pub const fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id_creation() {
        let id1 = ProcessId::new();
        let id2 = ProcessId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_thread_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = ThreadId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn test_address_space_ids_are_ordered() {
        let low = AddressSpaceId::from_raw(1);
        let high = AddressSpaceId::from_raw(7);
        assert!(low < high);
        assert_eq!(high.as_raw(), 7);
    }

    #[test]
    fn test_display_prefixes() {
        assert!(format!("{}", ProcessId::new()).starts_with("Process("));
        assert!(format!("{}", ThreadId::new()).starts_with("Thread("));
        assert!(format!("{}", StreamId::new()).starts_with("Stream("));
        assert_eq!(format!("{}", AddressSpaceId::from_raw(3)), "aspace:3");
        assert_eq!(format!("{}", ChainId::from_raw(9)), "chain#9");
    }

    #[test]
    fn test_chain_id_serde() {
        let id = ChainId::from_raw(42);
        let json = serde_json::to_string(&id).unwrap();
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

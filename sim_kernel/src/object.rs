//! Kernel objects reachable through descriptors

use crate::stream::LaneHandle;
use crate::sync::lock;
use crate::universe::Universe;
use kernel_api::{DescriptorInfo, KernelError};
use std::sync::{Arc, Mutex};

/// One reference to a kernel object
///
/// Cloning takes another reference to the same object; dropping releases it.
/// This is the value a universe slot owns.
#[derive(Debug, Clone)]
pub enum AnyDescriptor {
    Lane(LaneHandle),
    Memory(Arc<MemoryObject>),
    Universe(Arc<Universe>),
}

impl AnyDescriptor {
    pub fn info(&self) -> DescriptorInfo {
        match self {
            AnyDescriptor::Lane(_) => DescriptorInfo::Lane,
            AnyDescriptor::Memory(memory) => DescriptorInfo::Memory { size: memory.len() },
            AnyDescriptor::Universe(_) => DescriptorInfo::Universe,
        }
    }

    /// Number of live references to the underlying object
    ///
    /// For a lane this counts references to that lane only, not its peer.
    pub fn ref_count(&self) -> usize {
        match self {
            AnyDescriptor::Lane(lane) => lane.lane_refs(),
            AnyDescriptor::Memory(memory) => Arc::strong_count(memory),
            AnyDescriptor::Universe(universe) => Arc::strong_count(universe),
        }
    }

    /// True if both descriptors reference the same object
    pub fn same_object(&self, other: &AnyDescriptor) -> bool {
        match (self, other) {
            (AnyDescriptor::Lane(a), AnyDescriptor::Lane(b)) => a.same_lane(b),
            (AnyDescriptor::Memory(a), AnyDescriptor::Memory(b)) => Arc::ptr_eq(a, b),
            (AnyDescriptor::Universe(a), AnyDescriptor::Universe(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_lane(&self) -> Option<&LaneHandle> {
        match self {
            AnyDescriptor::Lane(lane) => Some(lane),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&Arc<MemoryObject>> {
        match self {
            AnyDescriptor::Memory(memory) => Some(memory),
            _ => None,
        }
    }

    pub fn as_universe(&self) -> Option<&Arc<Universe>> {
        match self {
            AnyDescriptor::Universe(universe) => Some(universe),
            _ => None,
        }
    }
}

/// A zero-filled, shareable block of kernel memory
#[derive(Debug)]
pub struct MemoryObject {
    bytes: Mutex<Vec<u8>>,
    size: usize,
}

impl MemoryObject {
    pub fn new(size: usize) -> Result<Self, KernelError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|err| KernelError::OutOfMemory(err.to_string()))?;
        bytes.resize(size, 0);
        Ok(Self {
            bytes: Mutex::new(bytes),
            size,
        })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn range(&self, offset: usize, length: usize) -> Result<std::ops::Range<usize>, KernelError> {
        offset
            .checked_add(length)
            .filter(|end| *end <= self.size)
            .map(|end| offset..end)
            .ok_or_else(|| {
                KernelError::IllegalArgs(format!(
                    "range {}+{} exceeds memory object of {} bytes",
                    offset, length, self.size
                ))
            })
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<(), KernelError> {
        let range = self.range(offset, out.len())?;
        out.copy_from_slice(&lock(&self.bytes)[range]);
        Ok(())
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), KernelError> {
        let range = self.range(offset, data.len())?;
        lock(&self.bytes)[range].copy_from_slice(data);
        Ok(())
    }
}

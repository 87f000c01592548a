//! Universes
//!
//! A universe is a process's handle table: an arena of slots, each owning at
//! most one [`AnyDescriptor`]. A handle names a slot index plus the slot's
//! generation at the time of attach, so a handle to a closed slot stays
//! invalid even after the slot is reused.
//!
//! The table has one lock. Critical sections only touch the slot array;
//! descriptors removed from the table are dropped after the lock is
//! released, since dropping the last reference to a lane runs the stream's
//! shutdown path.

use crate::object::AnyDescriptor;
use crate::sync::lock;
use core_types::Handle;
use kernel_api::{DescriptorInfo, KernelError};
use std::sync::Mutex;

#[derive(Debug)]
struct Slot {
    generation: u32,
    descriptor: Option<AnyDescriptor>,
}

#[derive(Debug, Default)]
struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl HandleTable {
    fn slot(&self, handle: Handle) -> Option<&Slot> {
        let slot = self.slots.get(handle.index()? as usize)?;
        (slot.generation == handle.generation() && slot.descriptor.is_some()).then_some(slot)
    }

    fn descriptor(&self, handle: Handle) -> Result<&AnyDescriptor, KernelError> {
        self.slot(handle)
            .and_then(|slot| slot.descriptor.as_ref())
            .ok_or(KernelError::InvalidHandle(handle))
    }
}

/// A process-local handle table
#[derive(Debug)]
pub struct Universe {
    capacity: usize,
    table: Mutex<HandleTable>,
}

impl Universe {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            table: Mutex::new(HandleTable::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        lock(&self.table).live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a descriptor and returns a fresh handle for it
    pub fn attach(&self, descriptor: AnyDescriptor) -> Result<Handle, KernelError> {
        let mut table = lock(&self.table);
        if table.live >= self.capacity {
            drop(table);
            drop(descriptor);
            return Err(KernelError::OutOfHandles);
        }

        let index = match table.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(table.slots.len()).map_err(|_| KernelError::OutOfHandles)?;
                table.slots.push(Slot {
                    generation: 1,
                    descriptor: None,
                });
                index
            }
        };
        let slot = &mut table.slots[index as usize];
        slot.descriptor = Some(descriptor);
        let handle = Handle::from_parts(index, slot.generation);
        table.live += 1;
        Ok(handle)
    }

    /// Removes a descriptor from the table and hands ownership to the caller
    pub fn detach(&self, handle: Handle) -> Result<AnyDescriptor, KernelError> {
        let mut table = lock(&self.table);
        table.descriptor(handle)?;

        let index = handle.index().ok_or(KernelError::InvalidHandle(handle))?;
        let slot = &mut table.slots[index as usize];
        let descriptor = slot
            .descriptor
            .take()
            .ok_or(KernelError::InvalidHandle(handle))?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        table.free.push(index);
        table.live -= 1;
        Ok(descriptor)
    }

    /// Drops the reference a handle owns
    pub fn close(&self, handle: Handle) -> Result<(), KernelError> {
        let descriptor = self.detach(handle)?;
        drop(descriptor);
        Ok(())
    }

    /// Takes another reference to the object behind a handle
    pub fn get(&self, handle: Handle) -> Result<AnyDescriptor, KernelError> {
        lock(&self.table).descriptor(handle).cloned()
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        lock(&self.table).slot(handle).is_some()
    }

    pub fn info(&self, handle: Handle) -> Result<DescriptorInfo, KernelError> {
        lock(&self.table).descriptor(handle).map(AnyDescriptor::info)
    }

    /// Live references to the object behind a handle, this one included
    pub fn ref_count(&self, handle: Handle) -> Result<usize, KernelError> {
        lock(&self.table).descriptor(handle).map(AnyDescriptor::ref_count)
    }

    /// Attaches a second reference to the same object in this universe
    pub fn duplicate(&self, handle: Handle) -> Result<Handle, KernelError> {
        let descriptor = self.get(handle)?;
        self.attach(descriptor)
    }

    /// Attaches a reference to the same object in `target`
    pub fn transfer(&self, handle: Handle, target: &Universe) -> Result<Handle, KernelError> {
        let descriptor = self.get(handle)?;
        target.attach(descriptor)
    }
}

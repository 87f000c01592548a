//! Owning and borrowed descriptors
//!
//! [`UniqueDescriptor`] owns one handle in one universe and closes it when
//! dropped. Moving it moves ownership; [`UniqueDescriptor::take`] moves it
//! out of a place and leaves the null handle behind. [`BorrowedDescriptor`]
//! is a copyable view tied by lifetime to an owner and can never close
//! anything.
//!
//! ```
//! use sim_kernel::{AnyDescriptor, MemoryObject, UniqueDescriptor, Universe};
//! use std::sync::Arc;
//!
//! let universe = Arc::new(Universe::new(16));
//! let memory = AnyDescriptor::Memory(Arc::new(MemoryObject::new(64).unwrap()));
//!
//! let owner = UniqueDescriptor::attach(universe.clone(), memory).unwrap();
//! let copy = owner.borrow().dup().unwrap();
//! assert_eq!(universe.len(), 2);
//!
//! drop(owner);
//! drop(copy);
//! assert!(universe.is_empty());
//! ```

use crate::object::AnyDescriptor;
use crate::universe::Universe;
use core_types::Handle;
use kernel_api::{DescriptorInfo, KernelError};
use std::fmt;
use std::sync::Arc;

/// The only owner of a handle
pub struct UniqueDescriptor {
    universe: Arc<Universe>,
    handle: Handle,
}

impl UniqueDescriptor {
    /// Attaches `descriptor` to `universe` and owns the new handle
    pub fn attach(universe: Arc<Universe>, descriptor: AnyDescriptor) -> Result<Self, KernelError> {
        let handle = universe.attach(descriptor)?;
        Ok(Self { universe, handle })
    }

    /// Takes ownership of a handle that is live in `universe`
    pub fn from_raw(universe: Arc<Universe>, handle: Handle) -> Self {
        Self { universe, handle }
    }

    pub fn null(universe: Arc<Universe>) -> Self {
        Self {
            universe,
            handle: Handle::NULL,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn borrow(&self) -> BorrowedDescriptor<'_> {
        BorrowedDescriptor {
            universe: &self.universe,
            handle: self.handle,
        }
    }

    /// A new owner of a new handle to the same object
    pub fn dup(&self) -> Result<UniqueDescriptor, KernelError> {
        self.borrow().dup()
    }

    /// Moves ownership out, leaving this descriptor null
    pub fn take(&mut self) -> UniqueDescriptor {
        let handle = std::mem::replace(&mut self.handle, Handle::NULL);
        UniqueDescriptor {
            universe: self.universe.clone(),
            handle,
        }
    }

    /// Gives up ownership without closing; the caller now owns the handle
    pub fn release(mut self) -> Handle {
        std::mem::replace(&mut self.handle, Handle::NULL)
    }

    /// Removes the object from the universe and returns the reference
    pub fn detach(mut self) -> Result<AnyDescriptor, KernelError> {
        let handle = std::mem::replace(&mut self.handle, Handle::NULL);
        self.universe.detach(handle)
    }

    pub fn info(&self) -> Result<DescriptorInfo, KernelError> {
        self.borrow().info()
    }
}

impl fmt::Debug for UniqueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UniqueDescriptor").field(&self.handle).finish()
    }
}

impl Drop for UniqueDescriptor {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        // The universe losing a handle this owner still holds means two
        // parties believed they owned it.
        if let Err(err) = self.universe.close(self.handle) {
            panic!("owned descriptor {} could not be closed: {}", self.handle, err);
        }
    }
}

/// A non-owning view of a handle
#[derive(Clone, Copy)]
pub struct BorrowedDescriptor<'a> {
    universe: &'a Arc<Universe>,
    handle: Handle,
}

impl<'a> BorrowedDescriptor<'a> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn dup(&self) -> Result<UniqueDescriptor, KernelError> {
        if self.handle.is_null() {
            return Err(KernelError::InvalidHandle(self.handle));
        }
        let handle = self.universe.duplicate(self.handle)?;
        Ok(UniqueDescriptor::from_raw(self.universe.clone(), handle))
    }

    pub fn get(&self) -> Result<AnyDescriptor, KernelError> {
        self.universe.get(self.handle)
    }

    pub fn info(&self) -> Result<DescriptorInfo, KernelError> {
        self.universe.info(self.handle)
    }
}

impl fmt::Debug for BorrowedDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BorrowedDescriptor").field(&self.handle).finish()
    }
}

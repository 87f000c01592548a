//! Cross-address-space access
//!
//! Kernel code running on behalf of one thread reaches into another
//! thread's memory only through these accessors. An accessor records the
//! target space and range; bytes move only on `copy_in`/`copy_out` or
//! [`transfer`], which hold the space lock for the duration of the copy and
//! nothing longer.
//!
//! ## Validation
//!
//! With [`AccessValidation::Eager`] the range is checked for residency and
//! permission at `acquire`. [`AccessValidation::Deferred`] skips that check
//! and leaves it to the copy. Either way a copy checks its whole destination
//! range before writing the first byte, so a fault never leaves a partial
//! copy behind.

use crate::address_space::{AddressSpace, PageMap};
use crate::config::AccessValidation;
use core_types::{straddles_page, AccessError, AccessKind, PAGE_SIZE};
use std::marker::PhantomData;
use std::sync::Arc;

/// A validated (or to-be-validated) byte range in some address space
#[derive(Debug, Clone)]
pub struct ForeignSpaceAccessor {
    space: Arc<AddressSpace>,
    address: u64,
    length: u64,
}

impl ForeignSpaceAccessor {
    pub fn acquire(
        space: Arc<AddressSpace>,
        address: u64,
        length: u64,
        access: AccessKind,
        validation: AccessValidation,
    ) -> Result<Self, AccessError> {
        address
            .checked_add(length)
            .ok_or(AccessError::RangeOverflow)?;
        if validation == AccessValidation::Eager {
            space.validate(address, length, access)?;
        }
        Ok(Self {
            space,
            address,
            length,
        })
    }

    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Writes `source` into the range, truncated to its length
    pub fn copy_in(&self, source: &[u8]) -> Result<usize, AccessError> {
        let count = (self.length as usize).min(source.len());
        self.space.lock().write(self.address, &source[..count])?;
        Ok(count)
    }

    /// Reads the range into `destination`, truncated to its length
    pub fn copy_out(&self, destination: &mut [u8]) -> Result<usize, AccessError> {
        let count = (self.length as usize).min(destination.len());
        self.space.lock().read(self.address, &mut destination[..count])?;
        Ok(count)
    }

    /// Reads the whole range
    pub fn read_all(&self) -> Result<Vec<u8>, AccessError> {
        let map = self.space.lock();
        map.check(self.address, self.length, AccessKind::Read)?;
        let mut out = vec![0u8; self.length as usize];
        map.read(self.address, &mut out)?;
        Ok(out)
    }
}

/// Copies `min(source.length, destination.length)` bytes between two ranges
///
/// The ranges may live in the same space and may overlap. When they live in
/// different spaces both locks are held for the copy, taken in ascending
/// space id order. Both ranges are checked before anything is staged.
pub fn transfer(
    destination: &ForeignSpaceAccessor,
    source: &ForeignSpaceAccessor,
) -> Result<u64, AccessError> {
    let count = destination.length.min(source.length);

    if Arc::ptr_eq(&destination.space, &source.space) {
        let mut map = source.space.lock();
        map.check(source.address, count, AccessKind::Read)?;
        map.check(destination.address, count, AccessKind::Write)?;
        let mut staging = vec![0u8; count as usize];
        map.read(source.address, &mut staging)?;
        map.write(destination.address, &staging)?;
        return Ok(count);
    }

    if source.space.id() < destination.space.id() {
        let source_map = source.space.lock();
        let mut destination_map = destination.space.lock();
        copy_split(&source_map, &mut destination_map, destination, source, count)
    } else {
        let mut destination_map = destination.space.lock();
        let source_map = source.space.lock();
        copy_split(&source_map, &mut destination_map, destination, source, count)
    }
}

fn copy_split(
    source_map: &PageMap,
    destination_map: &mut PageMap,
    destination: &ForeignSpaceAccessor,
    source: &ForeignSpaceAccessor,
    count: u64,
) -> Result<u64, AccessError> {
    source_map.check(source.address, count, AccessKind::Read)?;
    destination_map.check(destination.address, count, AccessKind::Write)?;
    let mut staging = vec![0u8; count as usize];
    source_map.read(source.address, &mut staging)?;
    destination_map.write(destination.address, &staging)?;
    Ok(count)
}

/// Fixed-size values a [`DirectSpaceAccessor`] can load and store
pub trait Plain: Copy {
    const SIZE: usize;

    fn read_le(bytes: &[u8]) -> Self;
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_plain {
    ($($ty:ty),*) => {
        $(
            impl Plain for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }

                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_plain!(u8, u16, u32, u64, i32, i64);

/// Accessor for one naturally aligned value
///
/// Natural alignment of a value no larger than a page means it never
/// straddles a page, so loads and stores go straight to a single page.
#[derive(Debug, Clone)]
pub struct DirectSpaceAccessor<T: Plain> {
    space: Arc<AddressSpace>,
    address: u64,
    _value: PhantomData<T>,
}

impl<T: Plain> DirectSpaceAccessor<T> {
    pub fn acquire(
        space: Arc<AddressSpace>,
        address: u64,
        access: AccessKind,
        validation: AccessValidation,
    ) -> Result<Self, AccessError> {
        let size = T::SIZE as u64;
        if size > PAGE_SIZE {
            return Err(AccessError::TooLarge { size });
        }
        if address % size != 0 || straddles_page(address, size) {
            return Err(AccessError::Misaligned {
                address,
                align: size,
            });
        }
        if validation == AccessValidation::Eager {
            space.validate(address, size, access)?;
        }
        Ok(Self {
            space,
            address,
            _value: PhantomData,
        })
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn load(&self) -> Result<T, AccessError> {
        let map = self.space.lock();
        let bytes = map.page_slice(self.address, T::SIZE, AccessKind::Read)?;
        Ok(T::read_le(bytes))
    }

    pub fn store(&self, value: T) -> Result<(), AccessError> {
        let mut map = self.space.lock();
        let bytes = map.page_slice_mut(self.address, T::SIZE)?;
        value.write_le(bytes);
        Ok(())
    }
}

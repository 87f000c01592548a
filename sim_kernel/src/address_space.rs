//! Address spaces for SimulatedKernel
//!
//! Each process owns one [`AddressSpace`]: a sparse set of 4 KiB pages with
//! per-page permissions. There is no MMU; "mapping" a page allocates its
//! backing bytes and "accessing" it checks the permission bits.
//!
//! All page operations happen under the space's single lock. Code that needs
//! two spaces at once (see [`crate::accessor::transfer`]) locks them in
//! ascending [`AddressSpaceId`] order.

use crate::sync::lock;
use core_types::{
    page_base, page_offset, AccessError, AccessKind, AddressSpaceId, MemoryPerms, PAGE_SIZE,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

struct Page {
    perms: MemoryPerms,
    bytes: Box<[u8]>,
}

impl Page {
    fn zeroed(perms: MemoryPerms) -> Self {
        Self {
            perms,
            bytes: vec![0u8; PAGE_SIZE as usize].into_boxed_slice(),
        }
    }
}

/// Returns the exclusive end of `[address, address + length)`
fn range_end(address: u64, length: u64) -> Result<u64, AccessError> {
    address
        .checked_add(length)
        .ok_or(AccessError::RangeOverflow)
}

/// Splits a range into per-page chunks of `(page, offset_in_page, done, len)`
fn for_each_chunk<F>(address: u64, length: usize, mut f: F) -> Result<(), AccessError>
where
    F: FnMut(u64, usize, usize, usize) -> Result<(), AccessError>,
{
    range_end(address, length as u64)?;
    let mut done = 0usize;
    while done < length {
        let current = address + done as u64;
        let offset = page_offset(current) as usize;
        let chunk = (PAGE_SIZE as usize - offset).min(length - done);
        f(page_base(current), offset, done, chunk)?;
        done += chunk;
    }
    Ok(())
}

/// The pages of one address space, reachable only through its lock
pub(crate) struct PageMap {
    pages: BTreeMap<u64, Page>,
}

impl PageMap {
    /// Checks that every byte of the range is mapped with `access`
    pub(crate) fn check(
        &self,
        address: u64,
        length: u64,
        access: AccessKind,
    ) -> Result<(), AccessError> {
        if length == 0 {
            return Ok(());
        }
        let end = range_end(address, length)?;
        let mut page = page_base(address);
        while page < end {
            let first = page.max(address);
            let entry = self
                .pages
                .get(&page)
                .ok_or(AccessError::Unmapped { address: first })?;
            if !entry.perms.allows(access) {
                return Err(AccessError::PermissionDenied {
                    address: first,
                    access,
                });
            }
            page = match page.checked_add(PAGE_SIZE) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(())
    }

    /// Copies `out.len()` bytes starting at `address` into `out`
    pub(crate) fn read(&self, address: u64, out: &mut [u8]) -> Result<(), AccessError> {
        self.check(address, out.len() as u64, AccessKind::Read)?;
        for_each_chunk(address, out.len(), |page, offset, done, len| {
            let entry = self
                .pages
                .get(&page)
                .ok_or(AccessError::Unmapped { address: page })?;
            out[done..done + len].copy_from_slice(&entry.bytes[offset..offset + len]);
            Ok(())
        })
    }

    /// Copies `data` to `address`
    ///
    /// The whole range is checked before the first byte is written.
    pub(crate) fn write(&mut self, address: u64, data: &[u8]) -> Result<(), AccessError> {
        self.check(address, data.len() as u64, AccessKind::Write)?;
        for_each_chunk(address, data.len(), |page, offset, done, len| {
            let entry = self
                .pages
                .get_mut(&page)
                .ok_or(AccessError::Unmapped { address: page })?;
            entry.bytes[offset..offset + len].copy_from_slice(&data[done..done + len]);
            Ok(())
        })
    }

    /// The bytes of a range that lies within one page
    pub(crate) fn page_slice(
        &self,
        address: u64,
        length: usize,
        access: AccessKind,
    ) -> Result<&[u8], AccessError> {
        self.check(address, length as u64, access)?;
        let offset = page_offset(address) as usize;
        let entry = self
            .pages
            .get(&page_base(address))
            .ok_or(AccessError::Unmapped { address })?;
        entry
            .bytes
            .get(offset..offset + length)
            .ok_or(AccessError::TooLarge {
                size: length as u64,
            })
    }

    pub(crate) fn page_slice_mut(
        &mut self,
        address: u64,
        length: usize,
    ) -> Result<&mut [u8], AccessError> {
        self.check(address, length as u64, AccessKind::Write)?;
        let offset = page_offset(address) as usize;
        let entry = self
            .pages
            .get_mut(&page_base(address))
            .ok_or(AccessError::Unmapped { address })?;
        entry
            .bytes
            .get_mut(offset..offset + length)
            .ok_or(AccessError::TooLarge {
                size: length as u64,
            })
    }
}

/// A simulated address space
pub struct AddressSpace {
    id: AddressSpaceId,
    pages: Mutex<PageMap>,
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl AddressSpace {
    pub fn new(id: AddressSpaceId) -> Self {
        Self {
            id,
            pages: Mutex::new(PageMap {
                pages: BTreeMap::new(),
            }),
        }
    }

    pub fn id(&self) -> AddressSpaceId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PageMap> {
        lock(&self.pages)
    }

    /// Maps zero-filled pages covering `[address, address + length)`
    ///
    /// `address` must be page aligned. Either every page is mapped or none
    /// is.
    pub fn map(&self, address: u64, length: u64, perms: MemoryPerms) -> Result<(), AccessError> {
        if page_offset(address) != 0 {
            return Err(AccessError::Misaligned {
                address,
                align: PAGE_SIZE,
            });
        }
        let end = range_end(address, length)?;
        let mut map = self.lock();

        if let Some((taken, _)) = map.pages.range(address..end).next() {
            return Err(AccessError::AlreadyMapped { address: *taken });
        }
        for base in (address..end).step_by(PAGE_SIZE as usize) {
            map.pages.insert(base, Page::zeroed(perms));
        }
        Ok(())
    }

    /// Unmaps every page overlapping the range; returns how many were mapped
    pub fn unmap(&self, address: u64, length: u64) -> Result<usize, AccessError> {
        let end = range_end(address, length)?;
        let mut map = self.lock();
        let bases: Vec<u64> = map
            .pages
            .range(page_base(address)..end)
            .map(|(base, _)| *base)
            .collect();
        for base in &bases {
            map.pages.remove(base);
        }
        Ok(bases.len())
    }

    /// Changes the permissions of already mapped pages
    pub fn protect(&self, address: u64, length: u64, perms: MemoryPerms) -> Result<(), AccessError> {
        let end = range_end(address, length)?;
        let mut map = self.lock();
        let mut page = page_base(address);
        while page < end {
            map.pages
                .get_mut(&page)
                .ok_or(AccessError::Unmapped { address: page })?
                .perms = perms;
            page = match page.checked_add(PAGE_SIZE) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(())
    }

    pub fn validate(&self, address: u64, length: u64, access: AccessKind) -> Result<(), AccessError> {
        self.lock().check(address, length, access)
    }

    pub fn is_mapped(&self, address: u64) -> bool {
        self.lock().pages.contains_key(&page_base(address))
    }

    pub fn mapped_pages(&self) -> usize {
        self.lock().pages.len()
    }

    pub fn read_bytes(&self, address: u64, length: usize) -> Result<Vec<u8>, AccessError> {
        let mut out = vec![0u8; length];
        self.lock().read(address, &mut out)?;
        Ok(out)
    }

    pub fn write_bytes(&self, address: u64, data: &[u8]) -> Result<(), AccessError> {
        self.lock().write(address, data)
    }
}

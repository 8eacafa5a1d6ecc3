//! Physical-to-virtual translation for managed memory.
//!
//! The allocator writes fill patterns and free-list links into the pages it
//! owns, so it needs a kernel virtual address for every managed physical
//! page. Kernels map all of RAM at a fixed offset (a higher-half direct map,
//! or identity on machines that run with paging off in the kernel);
//! `DirectMap` captures that offset.

use core::ptr::NonNull;

use kmem_lib::{PhysAddr, VirtAddr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectMap {
    offset: u64,
}

impl DirectMap {
    pub const IDENTITY: Self = Self { offset: 0 };

    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    pub const fn offset(self) -> u64 {
        self.offset
    }

    #[inline]
    pub const fn to_virt(self, phys: PhysAddr) -> VirtAddr {
        VirtAddr::new(phys.as_u64().wrapping_add(self.offset))
    }

    #[inline]
    pub const fn to_phys(self, virt: VirtAddr) -> PhysAddr {
        PhysAddr::new(virt.as_u64().wrapping_sub(self.offset))
    }

    /// Pointer to the first byte of the page at `phys`.
    ///
    /// # Panics
    ///
    /// Panics if the translation lands on the null address.
    #[inline]
    pub fn page_ptr(self, phys: PhysAddr) -> NonNull<u8> {
        match NonNull::new(self.to_virt(phys).as_mut_ptr::<u8>()) {
            Some(ptr) => ptr,
            None => panic!("direct map: {:#x} translates to null", phys),
        }
    }
}

impl Default for DirectMap {
    fn default() -> Self {
        Self::IDENTITY
    }
}

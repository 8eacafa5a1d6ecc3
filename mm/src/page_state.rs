//! One bit per managed page recording whether the allocator owns it.
//!
//! A set bit means "free, on some pool's list". Release sets the bit and
//! acquire clears it, each with a single atomic read-modify-write, so a
//! racing double release is caught by exactly one of the two callers.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

use kmem_lib::PhysAddr;

use crate::error::{MmError, MmResult};
use crate::mm_constants::{PAGE_SIZE, PAGE_SIZE_USIZE};

const BITS_PER_WORD: usize = u64::BITS as usize;

pub struct PageStateMap {
    words: NonNull<AtomicU64>,
    base: PhysAddr,
    pages: usize,
}

// SAFETY: the storage is only reached through atomics.
unsafe impl Send for PageStateMap {}
unsafe impl Sync for PageStateMap {}

impl PageStateMap {
    /// Storage bytes needed to track `pages` pages.
    pub const fn bytes_for(pages: usize) -> usize {
        pages.div_ceil(BITS_PER_WORD) * core::mem::size_of::<u64>()
    }

    /// Whole pages needed to store the map for `pages` pages.
    pub const fn pages_for(pages: usize) -> usize {
        Self::bytes_for(pages).div_ceil(PAGE_SIZE_USIZE)
    }

    /// Build a map over `pages` pages starting at `base`, all marked
    /// allocated.
    ///
    /// # Safety
    ///
    /// `storage` must be 8-byte aligned, writable for
    /// [`Self::bytes_for`]`(pages)` bytes, and used for nothing else for as
    /// long as the map lives.
    pub unsafe fn new(storage: NonNull<u8>, base: PhysAddr, pages: usize) -> Self {
        // SAFETY: the caller guarantees the storage size; zero is a valid
        // `AtomicU64`.
        unsafe { core::ptr::write_bytes(storage.as_ptr(), 0, Self::bytes_for(pages)) };
        Self {
            words: storage.cast(),
            base,
            pages,
        }
    }

    fn slot(&self, address: PhysAddr) -> (&AtomicU64, u64) {
        let index = ((address.as_u64() - self.base.as_u64()) / PAGE_SIZE) as usize;
        assert!(
            index < self.pages,
            "page state: {:#x} outside tracked range",
            address
        );
        // SAFETY: `index < pages` keeps the word inside the storage.
        let word = unsafe { &*self.words.as_ptr().add(index / BITS_PER_WORD) };
        (word, 1u64 << (index % BITS_PER_WORD))
    }

    /// Record that `address` went back to the allocator.
    pub fn mark_free(&self, address: PhysAddr) -> MmResult {
        let (word, bit) = self.slot(address);
        if word.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            return Err(MmError::DoubleFree { address });
        }
        Ok(())
    }

    /// Record that `address` was handed out.
    pub fn mark_allocated(&self, address: PhysAddr) -> MmResult {
        let (word, bit) = self.slot(address);
        if word.fetch_and(!bit, Ordering::AcqRel) & bit == 0 {
            return Err(MmError::NotFree { address });
        }
        Ok(())
    }

    pub fn is_free(&self, address: PhysAddr) -> bool {
        let (word, bit) = self.slot(address);
        word.load(Ordering::Acquire) & bit != 0
    }
}

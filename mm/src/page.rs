use core::fmt;
use core::ptr::NonNull;

use kmem_lib::PhysAddr;

use crate::mm_constants::PAGE_SIZE_USIZE;

/// Exclusive ownership of one allocated page.
///
/// Obtained from [`crate::PagePools::acquire`] and given back with
/// [`crate::PagePools::release`]. There is no `Clone` or `Copy`, so a page
/// cannot be released twice through safe code. Dropping a `Page` without
/// releasing it leaks the page.
#[must_use = "dropping a Page leaks it; hand it back with PagePools::release"]
pub struct Page {
    phys: PhysAddr,
    virt: NonNull<u8>,
}

// SAFETY: a `Page` is the only handle to its memory.
unsafe impl Send for Page {}
unsafe impl Sync for Page {}

impl Page {
    /// # Safety
    ///
    /// `virt` must map the page at `phys`, and the page must be owned by
    /// nobody else.
    #[inline]
    pub(crate) unsafe fn from_parts(phys: PhysAddr, virt: NonNull<u8>) -> Self {
        Self { phys, virt }
    }

    #[inline]
    pub fn phys(&self) -> PhysAddr {
        self.phys
    }

    /// Kernel virtual address the page is mapped at.
    #[inline]
    pub fn virt(&self) -> NonNull<u8> {
        self.virt
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.virt.as_ptr()
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.virt.as_ptr()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8; PAGE_SIZE_USIZE] {
        // SAFETY: the handle owns a whole mapped page.
        unsafe { &*self.virt.as_ptr().cast::<[u8; PAGE_SIZE_USIZE]>() }
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE_USIZE] {
        // SAFETY: as above, and `&mut self` makes the access unique.
        unsafe { &mut *self.virt.as_ptr().cast::<[u8; PAGE_SIZE_USIZE]>() }
    }

    /// Give up the handle and keep only the physical address.
    ///
    /// The page stays allocated; return it later with
    /// [`crate::PagePools::release_phys`].
    #[inline]
    pub fn into_phys(self) -> PhysAddr {
        self.phys
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:#x})", self.phys)
    }
}

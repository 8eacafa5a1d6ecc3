//! Physical and virtual address types.
//!
//! Both are `#[repr(transparent)]` newtypes over `u64`, so mixing up a
//! physical address with the kernel virtual address it is mapped at is a
//! type error rather than a silent memory corruption.
//!
//! ```ignore
//! use kmem_lib::addr::{PhysAddr, VirtAddr};
//!
//! let phys = PhysAddr::new(0x8000_1234);
//! assert!(!phys.is_page_aligned());
//! assert_eq!(phys.align_down(PAGE_SIZE), PhysAddr::new(0x8000_1000));
//! ```

use core::fmt;

use crate::alignment::{align_down_u64, align_up_u64, is_aligned_u64};

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// A physical memory address. Not dereferenceable; translate it first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

/// A kernel virtual address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

// =============================================================================
// PhysAddr implementation
// =============================================================================

impl PhysAddr {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Add an offset, wrapping on overflow.
    #[inline]
    pub const fn offset(self, off: u64) -> Self {
        Self(self.0.wrapping_add(off))
    }

    /// Align down to `align`, which must be a power of two.
    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two(), "align must be power of two");
        Self(align_down_u64(self.0, align))
    }

    /// Align up to `align`, which must be a power of two. Saturates instead
    /// of wrapping past the top of the address space.
    #[inline]
    pub const fn align_up(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two(), "align must be power of two");
        Self(align_up_u64(self.0, align))
    }

    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        is_aligned_u64(self.0, align)
    }

    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.is_aligned(PAGE_SIZE)
    }
}

impl fmt::LowerHex for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// =============================================================================
// VirtAddr implementation
// =============================================================================

impl VirtAddr {
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_alignment_helpers() {
        let addr = PhysAddr::new(0x8000_1234);
        assert!(!addr.is_page_aligned());
        assert_eq!(addr.align_down(PAGE_SIZE), PhysAddr::new(0x8000_1000));
        assert_eq!(addr.align_up(PAGE_SIZE), PhysAddr::new(0x8000_2000));
        assert!(PhysAddr::new(0x8000_2000).is_page_aligned());
    }

    #[test]
    fn align_up_saturates_at_top_of_address_space() {
        let top = PhysAddr::new(u64::MAX - 10);
        assert_eq!(top.align_up(PAGE_SIZE).as_u64(), u64::MAX & !(PAGE_SIZE - 1));
    }

    #[test]
    fn offset_wraps() {
        assert_eq!(PhysAddr::new(0x1000).offset(PAGE_SIZE), PhysAddr::new(0x2000));
        assert_eq!(PhysAddr::new(u64::MAX).offset(1), PhysAddr::NULL);
    }

    #[test]
    fn pointers_round_trip() {
        let byte = 0u8;
        let virt = VirtAddr::from_ptr(&byte as *const u8);
        assert_eq!(virt.as_mut_ptr::<u8>().cast_const(), &byte as *const u8);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(std::format!("{}", PhysAddr::new(0x8000_0000)), "0x80000000");
    }
}

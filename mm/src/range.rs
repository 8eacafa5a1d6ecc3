//! The physical interval under allocator control.

use kmem_lib::PhysAddr;

use crate::error::{MmError, MmResult};
use crate::mm_constants::{PAGE_SIZE, PAGE_SIZE_USIZE};

/// Page-aligned, half-open physical range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagedRange {
    start: PhysAddr,
    end: PhysAddr,
}

impl ManagedRange {
    /// Round `start` up and `end` down to page boundaries.
    ///
    /// A range too small to hold a whole page collapses to an empty range at
    /// the rounded-up start.
    ///
    /// # Panics
    ///
    /// Panics if `end < start`.
    pub fn from_raw(start: PhysAddr, end: PhysAddr) -> Self {
        if end < start {
            panic!("managed range: end {:#x} precedes start {:#x}", end, start);
        }

        let start = start.align_up(PAGE_SIZE);
        let end = end.align_down(PAGE_SIZE);
        if end < start {
            return Self { start, end: start };
        }
        Self { start, end }
    }

    #[inline]
    pub const fn start(&self) -> PhysAddr {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> PhysAddr {
        self.end
    }

    #[inline]
    pub const fn pages(&self) -> usize {
        ((self.end.as_u64() - self.start.as_u64()) / PAGE_SIZE) as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start.as_u64() == self.end.as_u64()
    }

    #[inline]
    pub fn contains(&self, address: PhysAddr) -> bool {
        self.start <= address && address < self.end
    }

    /// Whether `address` is something the allocator may take back.
    pub fn check(&self, address: PhysAddr) -> MmResult {
        if !address.is_page_aligned() {
            return Err(MmError::NotAligned {
                address,
                required: PAGE_SIZE,
            });
        }
        if !self.contains(address) {
            return Err(MmError::OutOfRange {
                address,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Index of the page at `address`, counted from `start`.
    #[inline]
    pub fn page_index(&self, address: PhysAddr) -> usize {
        debug_assert!(self.contains(address));
        ((address.as_u64() - self.start.as_u64()) / PAGE_SIZE) as usize
    }

    /// Split off the first `pages` pages (fewer if the range is shorter).
    pub fn split_front(self, pages: usize) -> (Self, Self) {
        let pages = pages.min(self.pages());
        let mid = self.start.offset(pages as u64 * PAGE_SIZE);
        (
            Self {
                start: self.start,
                end: mid,
            },
            Self {
                start: mid,
                end: self.end,
            },
        )
    }

    /// Every page address in the range, ascending.
    pub fn page_addrs(&self) -> impl Iterator<Item = PhysAddr> + use<> {
        (self.start.as_u64()..self.end.as_u64())
            .step_by(PAGE_SIZE_USIZE)
            .map(PhysAddr::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm_constants::{KERNBASE, PHYSTOP};

    const BASE: u64 = KERNBASE;

    #[test]
    fn default_machine_range_holds_128_mib() {
        let range = ManagedRange::from_raw(PhysAddr::new(KERNBASE), PhysAddr::new(PHYSTOP));
        assert_eq!(range.pages(), 32_768);
        assert!(!range.contains(PhysAddr::new(PHYSTOP)));
    }

    #[test]
    fn rounds_inward_to_whole_pages() {
        let range = ManagedRange::from_raw(PhysAddr::new(BASE + 1), PhysAddr::new(BASE + 0x3fff));
        assert_eq!(range.start(), PhysAddr::new(BASE + 0x1000));
        assert_eq!(range.end(), PhysAddr::new(BASE + 0x3000));
        assert_eq!(range.pages(), 2);
        assert_eq!(
            range.page_addrs().collect::<Vec<_>>(),
            [PhysAddr::new(BASE + 0x1000), PhysAddr::new(BASE + 0x2000)]
        );
    }

    #[test]
    fn sub_page_range_is_empty() {
        let range = ManagedRange::from_raw(PhysAddr::new(BASE + 0x10), PhysAddr::new(BASE + 0x20));
        assert!(range.is_empty());
        assert_eq!(range.pages(), 0);
        assert_eq!(range.page_addrs().count(), 0);
    }

    #[test]
    #[should_panic(expected = "precedes start")]
    fn inverted_range_panics() {
        let _ = ManagedRange::from_raw(PhysAddr::new(BASE + 0x2000), PhysAddr::new(BASE));
    }

    #[test]
    fn check_rejects_misaligned_then_foreign_addresses() {
        let range = ManagedRange::from_raw(PhysAddr::new(BASE), PhysAddr::new(BASE + 0xa000));
        assert_eq!(range.check(PhysAddr::new(BASE + 0x9000)), Ok(()));
        assert!(matches!(
            range.check(PhysAddr::new(BASE - 1)),
            Err(MmError::NotAligned { .. })
        ));
        assert!(matches!(
            range.check(PhysAddr::new(BASE - 0x1000)),
            Err(MmError::OutOfRange { .. })
        ));
        assert!(matches!(
            range.check(PhysAddr::new(BASE + 0xa000)),
            Err(MmError::OutOfRange { .. })
        ));
    }

    #[test]
    fn split_front_clamps() {
        let range = ManagedRange::from_raw(PhysAddr::new(BASE), PhysAddr::new(BASE + 0x3000));
        let (front, rest) = range.split_front(1);
        assert_eq!(front.pages(), 1);
        assert_eq!(rest.pages(), 2);
        assert_eq!(rest.start(), PhysAddr::new(BASE + 0x1000));
        assert_eq!(rest.page_index(PhysAddr::new(BASE + 0x2000)), 1);

        let (all, none) = range.split_front(10);
        assert_eq!(all, range);
        assert!(none.is_empty());
    }
}

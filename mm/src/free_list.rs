//! Intrusive singly linked list of free pages.
//!
//! A free page's first word holds the address of the next free page in the
//! same pool, so the list needs no storage of its own. This module is the
//! only place that reinterprets page memory as a list cell.

use core::ptr::NonNull;

#[repr(C)]
struct FreeCell {
    next: Option<NonNull<FreeCell>>,
}

/// Head of one pool's free list plus its length.
pub(crate) struct FreeList {
    head: Option<NonNull<FreeCell>>,
    len: usize,
}

// SAFETY: the list exclusively owns the pages linked into it; moving the
// head pointer to another CPU moves that ownership with it.
unsafe impl Send for FreeList {}

/// A run of cells detached from some list, owned by whoever holds it.
pub(crate) struct FreeChain {
    head: Option<NonNull<FreeCell>>,
    tail: Option<NonNull<FreeCell>>,
    len: usize,
}

// SAFETY: see `FreeList`.
unsafe impl Send for FreeChain {}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Link `page` in at the head.
    ///
    /// # Safety
    ///
    /// `page` must be page-aligned, writable for at least one word, not on
    /// any list, and owned by nobody else from now on.
    #[inline]
    pub(crate) unsafe fn push(&mut self, page: NonNull<u8>) {
        let cell = page.cast::<FreeCell>();
        // SAFETY: the caller hands over a writable, aligned page.
        unsafe { cell.as_ptr().write(FreeCell { next: self.head }) };
        self.head = Some(cell);
        self.len += 1;
    }

    /// Unlink the head page.
    #[inline]
    pub(crate) fn pop(&mut self) -> Option<NonNull<u8>> {
        let cell = self.head?;
        // SAFETY: every linked cell was written by `push` or `splice`.
        self.head = unsafe { cell.as_ref().next };
        self.len -= 1;
        Some(cell.cast())
    }

    /// Detach up to `max` pages from the head, keeping their order.
    pub(crate) fn take(&mut self, max: usize) -> FreeChain {
        let Some(first) = self.head.filter(|_| max > 0) else {
            return FreeChain::empty();
        };

        let mut last = first;
        let mut taken = 1;
        // SAFETY: walking cells owned by this list.
        while taken < max {
            match unsafe { last.as_ref().next } {
                Some(next) => {
                    last = next;
                    taken += 1;
                }
                None => break,
            }
        }

        // SAFETY: `last` is a live cell of this list.
        unsafe {
            self.head = last.as_ref().next;
            (*last.as_ptr()).next = None;
        }
        self.len -= taken;

        FreeChain {
            head: Some(first),
            tail: Some(last),
            len: taken,
        }
    }

    /// Link a detached chain in front of the current head.
    pub(crate) fn splice(&mut self, chain: FreeChain) {
        let (Some(head), Some(tail)) = (chain.head, chain.tail) else {
            return;
        };
        // SAFETY: the chain owns its cells; `tail` is its last one.
        unsafe { (*tail.as_ptr()).next = self.head };
        self.head = Some(head);
        self.len += chain.len;
    }

    /// Pages currently on the list, head first.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = NonNull<u8>> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let cell = cursor?;
            // SAFETY: walking cells owned by this list.
            cursor = unsafe { cell.as_ref().next };
            Some(cell.cast())
        })
    }
}

impl FreeChain {
    pub(crate) const fn empty() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append `other` after this chain's tail.
    pub(crate) fn append(&mut self, other: FreeChain) {
        let Some(other_head) = other.head else {
            return;
        };
        match self.tail {
            // SAFETY: `tail` is the last cell of a chain we own.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(other_head) },
            None => self.head = Some(other_head),
        }
        self.tail = other.tail;
        self.len += other.len;
    }
}

#[cfg(test)]
mod tests {
    use kmem_lib::testing::PageArena;

    use super::*;
    use crate::mm_constants::PAGE_SIZE_USIZE;

    fn page(arena: &PageArena, index: usize) -> NonNull<u8> {
        // SAFETY: index is within the arena.
        NonNull::new(unsafe { arena.as_ptr().add(index * PAGE_SIZE_USIZE) }).unwrap()
    }

    fn filled(arena: &PageArena, pages: usize) -> FreeList {
        let mut list = FreeList::new();
        for index in 0..pages {
            // SAFETY: distinct arena pages, owned by the test.
            unsafe { list.push(page(arena, index)) };
        }
        list
    }

    #[test]
    fn push_pop_is_lifo() {
        let arena = PageArena::new(3);
        let mut list = filled(&arena, 3);
        assert_eq!(list.len(), 3);
        assert_eq!(list.pop(), Some(page(&arena, 2)));
        assert_eq!(list.pop(), Some(page(&arena, 1)));
        assert_eq!(list.pop(), Some(page(&arena, 0)));
        assert_eq!(list.pop(), None);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn take_detaches_a_prefix_in_order() {
        let arena = PageArena::new(5);
        let mut list = filled(&arena, 5);

        let chain = list.take(2);
        assert_eq!(chain.len(), 2);
        assert_eq!(list.len(), 3);
        assert_eq!(list.iter().collect::<Vec<_>>(), [page(&arena, 2), page(&arena, 1), page(&arena, 0)]);

        let mut other = FreeList::new();
        other.splice(chain);
        assert_eq!(other.iter().collect::<Vec<_>>(), [page(&arena, 4), page(&arena, 3)]);
    }

    #[test]
    fn take_stops_at_the_end_and_handles_zero() {
        let arena = PageArena::new(2);
        let mut list = filled(&arena, 2);

        assert!(list.take(0).is_empty());
        assert_eq!(list.len(), 2);

        let chain = list.take(10);
        assert_eq!(chain.len(), 2);
        assert!(list.is_empty());
        assert!(list.take(1).is_empty());
    }

    #[test]
    fn splice_goes_in_front_of_existing_pages() {
        let arena = PageArena::new(4);
        let mut donor = FreeList::new();
        let mut target = FreeList::new();
        // SAFETY: distinct arena pages.
        unsafe {
            donor.push(page(&arena, 0));
            donor.push(page(&arena, 1));
            target.push(page(&arena, 2));
        }

        target.splice(donor.take(2));
        assert_eq!(target.len(), 3);
        assert_eq!(
            target.iter().collect::<Vec<_>>(),
            [page(&arena, 1), page(&arena, 0), page(&arena, 2)]
        );
    }

    #[test]
    fn chains_append() {
        let arena = PageArena::new(4);
        let mut a = filled(&arena, 2);
        let mut chain = FreeChain::empty();
        chain.append(a.take(1));
        chain.append(FreeChain::empty());
        chain.append(a.take(1));
        assert_eq!(chain.len(), 2);

        let mut list = FreeList::new();
        // SAFETY: page 3 is unused by the other lists.
        unsafe { list.push(page(&arena, 3)) };
        list.splice(chain);
        assert_eq!(
            list.iter().collect::<Vec<_>>(),
            [page(&arena, 1), page(&arena, 0), page(&arena, 3)]
        );
    }
}

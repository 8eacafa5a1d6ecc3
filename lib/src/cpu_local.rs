//! Fixed-size per-CPU storage.
//!
//! `CpuLocal<T>` holds one cache-line aligned `T` per possible CPU. Slots are
//! addressed by CPU index; the type itself does not synchronize anything, so
//! `T` is expected to carry its own locking or atomics. Access to "this CPU's
//! slot" goes through a [`PreemptGuard`], which keeps the caller on the CPU
//! whose slot it holds.
//!
//! ```ignore
//! static COUNTERS: CpuLocal<AtomicU64> =
//!     CpuLocal::new_with([const { CacheAligned(AtomicU64::new(0)) }; MAX_CPUS]);
//!
//! let pin = cpus.pin();
//! COUNTERS.pinned(&pin).fetch_add(1, Ordering::Relaxed);
//! ```

use core::ops::Deref;

use crate::cpu::{Cpu, MAX_CPUS};
use crate::preempt::PreemptGuard;

#[repr(C, align(64))]
pub struct CacheAligned<T>(pub T);

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

pub struct CpuLocal<T> {
    slots: [CacheAligned<T>; MAX_CPUS],
}

impl<T> CpuLocal<T> {
    pub const fn new_with(init: [CacheAligned<T>; MAX_CPUS]) -> Self {
        Self { slots: init }
    }

    /// Slot of an arbitrary CPU.
    ///
    /// # Panics
    ///
    /// Panics if `cpu >= MAX_CPUS`.
    #[inline]
    pub fn get(&self, cpu: usize) -> &T {
        match self.slots.get(cpu) {
            Some(slot) => &slot.0,
            None => panic!("cpu index {} exceeds MAX_CPUS ({})", cpu, MAX_CPUS),
        }
    }

    /// Slot of the CPU the guard pins the caller to.
    #[inline]
    pub fn pinned<'a, C: Cpu>(&'a self, pin: &'a PreemptGuard<'_, C>) -> &'a T {
        self.get(pin.cpu_id())
    }
}

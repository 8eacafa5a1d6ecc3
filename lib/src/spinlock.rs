use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::mutex::{SpinMutex, SpinMutexGuard};

use crate::cpu::Cpu;
use crate::preempt::PreemptGuard;

const NO_HOLDER: usize = usize::MAX;

/// Spinlock that may only be taken with interrupts masked.
///
/// Locking requires a [`PreemptGuard`], so the "interrupts off while a
/// spinlock is held" rule is checked by the type system instead of by
/// convention: an interrupt handler can never spin on a lock its own CPU
/// already holds.
///
/// Each lock carries a static label used in diagnostics, and remembers which
/// CPU holds it so a recursive acquire on the same CPU is reported instead of
/// spinning forever.
pub struct IrqSpinLock<T> {
    label: &'static str,
    holder: AtomicUsize,
    inner: SpinMutex<T>,
}

pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    inner: SpinMutexGuard<'a, T>,
    // Ties the guard to the borrow of the PreemptGuard that licensed it.
    _pin: PhantomData<&'a ()>,
}

impl<T> IrqSpinLock<T> {
    #[inline]
    pub const fn new(label: &'static str, data: T) -> Self {
        Self {
            label,
            holder: AtomicUsize::new(NO_HOLDER),
            inner: SpinMutex::new(data),
        }
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Whether `cpu` currently holds this lock.
    #[inline]
    pub fn holding(&self, cpu: usize) -> bool {
        self.holder.load(Ordering::Relaxed) == cpu
    }

    /// Spin until the lock is ours.
    ///
    /// # Panics
    ///
    /// Panics if the pinned CPU already holds the lock.
    #[inline]
    pub fn lock<'a, C: Cpu>(&'a self, pin: &'a PreemptGuard<'_, C>) -> IrqSpinLockGuard<'a, T> {
        let cpu = pin.cpu_id();
        if self.holding(cpu) {
            panic!("acquire {}: already held by cpu {}", self.label, cpu);
        }

        let inner = self.inner.lock();
        self.holder.store(cpu, Ordering::Relaxed);
        IrqSpinLockGuard {
            lock: self,
            inner,
            _pin: PhantomData,
        }
    }

    /// Take the lock only if nobody holds it.
    #[inline]
    pub fn try_lock<'a, C: Cpu>(
        &'a self,
        pin: &'a PreemptGuard<'_, C>,
    ) -> Option<IrqSpinLockGuard<'a, T>> {
        let cpu = pin.cpu_id();
        if self.holding(cpu) {
            panic!("acquire {}: already held by cpu {}", self.label, cpu);
        }

        let inner = self.inner.try_lock()?;
        self.holder.store(cpu, Ordering::Relaxed);
        Some(IrqSpinLockGuard {
            lock: self,
            inner,
            _pin: PhantomData,
        })
    }
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        // Clear ownership first; `inner` unlocks when the fields drop.
        self.lock.holder.store(NO_HOLDER, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preempt::CpuSet;
    use crate::testing::sim::SimCpu;

    #[test]
    fn lock_tracks_holder() {
        let cpus = CpuSet::new(SimCpu::new());
        let lock = IrqSpinLock::new("test_lock", 0u32);

        let pin = cpus.pin();
        {
            let mut guard = lock.lock(&pin);
            *guard += 1;
            assert!(lock.holding(0));
        }
        assert!(!lock.holding(0));
        assert_eq!(*lock.lock(&pin), 1);
    }

    #[test]
    fn try_lock_fails_while_another_cpu_holds() {
        let cpus = CpuSet::new(SimCpu::new());
        let lock = IrqSpinLock::new("test_lock", ());

        let pin = cpus.pin();
        let _held = lock.lock(&pin);
        SimCpu::run_on(1, || {
            let other = cpus.pin();
            assert!(lock.try_lock(&other).is_none());
        });
    }

    #[test]
    #[should_panic(expected = "acquire test_lock: already held by cpu 0")]
    fn recursive_acquire_panics() {
        let cpus = CpuSet::new(SimCpu::new());
        let lock = IrqSpinLock::new("test_lock", ());

        let pin = cpus.pin();
        let _first = lock.lock(&pin);
        let _second = lock.lock(&pin);
    }
}

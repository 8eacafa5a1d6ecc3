//! Nesting-safe interrupt masking.
//!
//! RAII counterpart of the classic `push_off`/`pop_off` pair. Holding a
//! [`PreemptGuard`] keeps interrupts off on the current CPU, which also stops
//! the scheduler tick from migrating the caller, so the CPU index recorded in
//! the guard stays valid until it drops.
//!
//! Each CPU keeps a nesting depth. Only the outermost guard touches the
//! interrupt flag: it records whether interrupts were on before masking them,
//! and on drop the flag is restored to exactly that state. Inner guards only
//! move the depth counter, so an inner critical section can never re-enable
//! interrupts underneath an outer one.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::cpu::{Cpu, MAX_CPUS};
use crate::cpu_local::{CacheAligned, CpuLocal};

/// Per-CPU nesting record. Only ever touched by its own CPU with interrupts
/// masked, so relaxed ordering is sufficient.
struct IrqNest {
    depth: AtomicU32,
    was_enabled: AtomicBool,
}

impl IrqNest {
    const fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
            was_enabled: AtomicBool::new(false),
        }
    }
}

/// A [`Cpu`] backend together with the per-CPU interrupt nesting state.
pub struct CpuSet<C> {
    cpu: C,
    nest: CpuLocal<IrqNest>,
}

impl<C: Cpu> CpuSet<C> {
    pub const fn new(cpu: C) -> Self {
        Self {
            cpu,
            nest: CpuLocal::new_with([const { CacheAligned(IrqNest::new()) }; MAX_CPUS]),
        }
    }

    #[inline]
    pub fn platform(&self) -> &C {
        &self.cpu
    }

    /// Mask interrupts on the current CPU and pin the caller to it.
    #[inline]
    pub fn pin(&self) -> PreemptGuard<'_, C> {
        let was_enabled = self.cpu.interrupts_enabled();
        self.cpu.disable_interrupts();

        let cpu_id = self.cpu.current();
        let nest = self.nest.get(cpu_id);
        if nest.depth.load(Ordering::Relaxed) == 0 {
            nest.was_enabled.store(was_enabled, Ordering::Relaxed);
        }
        nest.depth.fetch_add(1, Ordering::Relaxed);

        PreemptGuard {
            set: self,
            cpu_id,
            _marker: PhantomData,
        }
    }

    /// Current nesting depth of `cpu`.
    #[inline]
    pub fn depth(&self, cpu: usize) -> u32 {
        self.nest.get(cpu).depth.load(Ordering::Relaxed)
    }
}

/// Guard that keeps interrupts masked on one CPU while held.
/// !Send/!Sync: it must be dropped on the CPU that created it.
#[must_use = "if unused, interrupts are restored immediately"]
pub struct PreemptGuard<'a, C: Cpu> {
    set: &'a CpuSet<C>,
    cpu_id: usize,
    _marker: PhantomData<*mut ()>,
}

impl<C: Cpu> PreemptGuard<'_, C> {
    /// The CPU the holder is pinned to.
    #[inline]
    pub fn cpu_id(&self) -> usize {
        self.cpu_id
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.set.depth(self.cpu_id)
    }
}

impl<C: Cpu> Drop for PreemptGuard<'_, C> {
    fn drop(&mut self) {
        let cpu = &self.set.cpu;
        debug_assert_eq!(cpu.current(), self.cpu_id, "preempt guard migrated");

        if cpu.interrupts_enabled() {
            panic!("preempt restore on cpu {}: interruptible", self.cpu_id);
        }

        let nest = self.set.nest.get(self.cpu_id);
        let prev = nest.depth.load(Ordering::Relaxed);
        if prev == 0 {
            panic!("preempt restore on cpu {}: depth underflow", self.cpu_id);
        }
        nest.depth.store(prev - 1, Ordering::Relaxed);

        if prev == 1 && nest.was_enabled.load(Ordering::Relaxed) {
            cpu.enable_interrupts();
        }
    }
}

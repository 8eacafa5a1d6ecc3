//! x86_64 [`Cpu`] backend.
//!
//! Interrupt control goes through `cli`/`sti` and RFLAGS.IF. The CPU index
//! comes from a reader function supplied by the kernel (typically a GS-based
//! per-CPU record or the local APIC ID mapped to a dense index), since how
//! CPUs are numbered is a boot-time decision this crate does not own.

use ::x86_64::instructions::interrupts;

use crate::cpu::{Cpu, MAX_CPUS};

pub type CpuIndexFn = fn() -> usize;

pub struct X86Cpu {
    cpu_index: CpuIndexFn,
}

fn boot_cpu_index() -> usize {
    0
}

impl X86Cpu {
    pub const fn new(cpu_index: CpuIndexFn) -> Self {
        Self { cpu_index }
    }

    /// Single-processor configuration: every caller is CPU 0.
    pub const fn uniprocessor() -> Self {
        Self::new(boot_cpu_index)
    }
}

impl Cpu for X86Cpu {
    #[inline]
    fn current(&self) -> usize {
        let index = (self.cpu_index)();
        debug_assert!(index < MAX_CPUS, "cpu index {} out of range", index);
        index
    }

    #[inline]
    fn interrupts_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    #[inline]
    fn disable_interrupts(&self) {
        interrupts::disable();
    }

    #[inline]
    fn enable_interrupts(&self) {
        interrupts::enable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reading RFLAGS is unprivileged, and IF is always set in user mode.
    #[test]
    fn reads_interrupt_flag_from_user_mode() {
        let cpu = X86Cpu::uniprocessor();
        assert!(cpu.interrupts_enabled());
        assert_eq!(cpu.current(), 0);
    }

    #[test]
    fn uses_supplied_index_reader() {
        fn third() -> usize {
            3
        }
        assert_eq!(X86Cpu::new(third).current(), 3);
    }
}

//! Processor identity and local interrupt control.
//!
//! Everything above this module is written against the [`Cpu`] trait rather
//! than raw instructions. A bare-metal kernel plugs in a backend from
//! [`crate::arch`]; host-side tests plug in the simulated platform from
//! `testing::sim`.

/// Maximum number of CPUs supported. Per-CPU arrays are sized by this.
pub const MAX_CPUS: usize = 8;

/// Hooks into the processor the caller is running on.
///
/// `current` is only meaningful while interrupts are disabled: with
/// interrupts on, a timer tick may migrate the running task and the answer
/// goes stale. Callers go through [`crate::preempt::CpuSet::pin`], which
/// masks interrupts before asking.
pub trait Cpu: Sync {
    /// Index (`0..MAX_CPUS`) of the CPU executing the caller.
    fn current(&self) -> usize;

    fn interrupts_enabled(&self) -> bool;

    fn disable_interrupts(&self);

    fn enable_interrupts(&self);
}

#![cfg_attr(not(any(test, feature = "sim")), no_std)]

pub mod addr;
pub mod alignment;
pub mod arch;
pub mod cpu;
pub mod cpu_local;
pub mod klog;
pub mod preempt;
pub mod spinlock;

#[cfg(any(test, feature = "sim"))]
pub mod testing;

#[doc(hidden)]
pub use paste;

pub use addr::{PAGE_SHIFT, PAGE_SIZE, PhysAddr, VirtAddr};
pub use alignment::{align_down_u64, align_up_u64, is_aligned_u64};
pub use cpu::{Cpu, MAX_CPUS};
pub use cpu_local::{CacheAligned, CpuLocal};
pub use klog::{KlogBackend, klog_init, klog_register_backend};
pub use preempt::{CpuSet, PreemptGuard};
pub use spinlock::{IrqSpinLock, IrqSpinLockGuard};

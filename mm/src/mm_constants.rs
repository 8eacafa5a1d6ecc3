//! Memory and allocator constants.
//!
//! Page geometry and the CPU limit come from `kmem_lib` so every crate in the
//! workspace agrees on them.

pub use kmem_lib::addr::{PAGE_SHIFT, PAGE_SIZE};
pub use kmem_lib::cpu::MAX_CPUS;

pub const PAGE_SIZE_USIZE: usize = PAGE_SIZE as usize;

/// Most pages one CPU moves into its pool during a single steal event.
pub const STEAL_QUOTA: usize = 64;

/// Byte written over a page when it is released.
pub const FREE_FILL: u8 = 0x01;
/// Byte written over a page when it is handed out.
pub const ALLOC_FILL: u8 = 0x05;

/// Start of RAM on the QEMU `virt` machine.
pub const KERNBASE: u64 = 0x8000_0000;
/// End of the RAM the kernel manages (128 MiB).
pub const PHYSTOP: u64 = KERNBASE + 128 * 1024 * 1024;

/// Per-CPU pool lock names, as shown in lock diagnostics.
pub const POOL_LOCK_LABELS: [&str; MAX_CPUS] = [
    "kmem_cpu_0",
    "kmem_cpu_1",
    "kmem_cpu_2",
    "kmem_cpu_3",
    "kmem_cpu_4",
    "kmem_cpu_5",
    "kmem_cpu_6",
    "kmem_cpu_7",
];

const _: () = {
    assert!(FREE_FILL != ALLOC_FILL);
    assert!(PAGE_SIZE_USIZE >= core::mem::size_of::<usize>());
    assert!(STEAL_QUOTA > 0);
    assert!(KERNBASE % PAGE_SIZE == 0 && PHYSTOP % PAGE_SIZE == 0);
    assert!(PHYSTOP > KERNBASE);
};

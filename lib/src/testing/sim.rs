//! Simulated SMP platform.
//!
//! Each host thread plays one CPU: it binds itself to an index with
//! [`SimCpu::bind`] (or temporarily with [`SimCpu::run_on`]) and from then on
//! `current()` reports that index. The interrupt flag is tracked per simulated
//! CPU, so masking on "CPU 1" is invisible to "CPU 0".
//!
//! Threads that never bind run as CPU 0. A test must not run two threads as
//! the same CPU at once; the per-CPU nesting state assumes exclusive use, as
//! real hardware guarantees.

use core::cell::Cell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::alloc::{self, Layout};
use std::string::{String, ToString};
use std::sync::Mutex;
use std::vec::Vec;

use crate::addr::PAGE_SIZE;
use crate::cpu::{Cpu, MAX_CPUS};

std::thread_local! {
    static BOUND_CPU: Cell<usize> = const { Cell::new(0) };
}

pub struct SimCpu {
    irq_enabled: [AtomicBool; MAX_CPUS],
    irq_off_transitions: [AtomicUsize; MAX_CPUS],
}

impl SimCpu {
    /// All CPUs start with interrupts enabled, as a running kernel thread would.
    pub const fn new() -> Self {
        Self {
            irq_enabled: [const { AtomicBool::new(true) }; MAX_CPUS],
            irq_off_transitions: [const { AtomicUsize::new(0) }; MAX_CPUS],
        }
    }

    /// Make the calling thread run as `cpu` from now on.
    pub fn bind(cpu: usize) {
        assert!(cpu < MAX_CPUS, "cpu {} exceeds MAX_CPUS ({})", cpu, MAX_CPUS);
        BOUND_CPU.with(|bound| bound.set(cpu));
    }

    pub fn bound() -> usize {
        BOUND_CPU.with(|bound| bound.get())
    }

    /// Run `f` as `cpu`, then switch the thread back to its previous CPU.
    pub fn run_on<R>(cpu: usize, f: impl FnOnce() -> R) -> R {
        let previous = Self::bound();
        Self::bind(cpu);
        let result = f();
        Self::bind(previous);
        result
    }

    pub fn interrupts_enabled_on(&self, cpu: usize) -> bool {
        self.irq_enabled[cpu].load(Ordering::SeqCst)
    }

    /// How many times interrupts on `cpu` went from enabled to disabled.
    pub fn irq_off_transitions(&self, cpu: usize) -> usize {
        self.irq_off_transitions[cpu].load(Ordering::SeqCst)
    }
}

impl Default for SimCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for SimCpu {
    fn current(&self) -> usize {
        Self::bound()
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled_on(self.current())
    }

    fn disable_interrupts(&self) {
        let cpu = self.current();
        if self.irq_enabled[cpu].swap(false, Ordering::SeqCst) {
            self.irq_off_transitions[cpu].fetch_add(1, Ordering::SeqCst);
        }
    }

    fn enable_interrupts(&self) {
        self.irq_enabled[self.current()].store(true, Ordering::SeqCst);
    }
}

/// Page-aligned host memory standing in for a physical range.
///
/// Pair it with a direct-map offset of `arena.base() - phys_base` to make a
/// fake physical range `[phys_base, phys_base + len)` resolve into the arena.
///
/// A zero-page arena still owns one page of backing memory, so its base is a
/// real address, but reports a length of zero.
pub struct PageArena {
    ptr: NonNull<u8>,
    layout: Layout,
    len: usize,
}

// SAFETY: the arena exclusively owns its allocation.
unsafe impl Send for PageArena {}
unsafe impl Sync for PageArena {}

impl PageArena {
    pub fn new(pages: usize) -> Self {
        let size = pages.max(1) * PAGE_SIZE as usize;
        let layout = match Layout::from_size_align(size, PAGE_SIZE as usize) {
            Ok(layout) => layout,
            Err(err) => panic!("bad arena layout for {} pages: {}", pages, err),
        };
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Self {
            ptr,
            layout,
            len: pages * PAGE_SIZE as usize,
        }
    }

    /// Virtual address of the first byte.
    pub fn base(&self) -> u64 {
        self.ptr.as_ptr() as usize as u64
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Offset that maps `phys_base` onto the first byte of the arena.
    pub fn direct_map_offset(&self, phys_base: u64) -> u64 {
        self.base().wrapping_sub(phys_base)
    }
}

impl Drop for PageArena {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn capture_backend(args: core::fmt::Arguments<'_>) {
    let line = args.to_string();
    if let Ok(mut lines) = CAPTURED.lock() {
        lines.push(line);
    }
}

/// Install klog with a backend that records every line in memory.
///
/// Shared by every test in the process, so assertions should look for the
/// lines they expect rather than compare the whole buffer.
pub fn capture_logs(level: log::LevelFilter) {
    crate::klog::klog_init(level);
    crate::klog::klog_register_backend(capture_backend);
}

pub fn captured_lines() -> Vec<String> {
    match CAPTURED.lock() {
        Ok(lines) => lines.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

//! Kernel logging sink.
//!
//! Code throughout the workspace logs through the `log` facade
//! (`log::info!`, `log::debug!`, ...). This module provides the facade's
//! implementation: every record is formatted into a single line and handed
//! to one **backend** function pointer, registered at runtime by whatever
//! owns the console (a serial driver in a kernel, a capture buffer in tests).
//!
//! # Backend contract
//!
//! The backend receives the pre-formatted arguments for a **single log line**
//! and must write them, plus a trailing newline, without interleaving output
//! from other CPUs.
//!
//! Until a backend is registered, records are dropped.
//!
//! ```ignore
//! kmem_lib::klog::klog_init(log::LevelFilter::Info);
//! kmem_lib::klog::klog_register_backend(serial_backend);
//! ```

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

use log::{LevelFilter, Log, Metadata, Record};

/// Signature of a klog backend.
pub type KlogBackend = fn(fmt::Arguments<'_>);

/// Stored as a raw pointer; `null` means "no backend yet".
static BACKEND: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

struct Klog;

static LOGGER: Klog = Klog;

impl Log for Klog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        dispatch(format_args!(
            "[{:<5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

#[inline]
fn dispatch(args: fmt::Arguments<'_>) {
    let ptr = BACKEND.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    // SAFETY: `klog_register_backend` only stores valid `KlogBackend` fn
    // pointers, which have the same size as `*mut ()`.
    let backend: KlogBackend = unsafe { core::mem::transmute::<*mut (), KlogBackend>(ptr) };
    backend(args);
}

/// Install klog as the `log` implementation and set the maximum level.
///
/// Returns false if some logger (klog or another) was already installed; the
/// level is updated either way.
pub fn klog_init(level: LevelFilter) -> bool {
    let installed = log::set_logger(&LOGGER).is_ok();
    log::set_max_level(level);
    installed
}

/// Route all subsequent log lines to `backend`.
pub fn klog_register_backend(backend: KlogBackend) {
    BACKEND.store(backend as *mut (), Ordering::Release);
}

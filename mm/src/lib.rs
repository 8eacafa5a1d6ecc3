//! Per-CPU physical page allocator.
//!
//! A contiguous physical range is cut into 4 KiB pages which are handed out
//! to, and taken back from, the rest of the kernel. Each CPU owns a pool of
//! free pages behind its own lock; a CPU whose pool runs dry steals a bounded
//! batch from the others.
//!
//! ```ignore
//! static PAGES: PagePools<X86Cpu> =
//!     PagePools::new(X86Cpu::new(cpu_index), DirectMap::new(HHDM_BASE), PoolConfig::DEFAULT);
//!
//! PAGES.init(PhysAddr::new(kernel_end), PhysAddr::new(PHYSTOP));
//! let page = PAGES.acquire()?;
//! PAGES.release(page);
//! ```

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod direct_map;
pub mod error;
mod free_list;
pub mod mm_constants;
pub mod page;
pub mod page_alloc;
pub mod page_state;
pub mod range;

pub use config::PoolConfig;
pub use direct_map::DirectMap;
pub use error::{MmError, MmResult};
pub use kmem_lib::{PhysAddr, VirtAddr};
pub use page::Page;
pub use page_alloc::{AllocFlags, PagePools, PoolStatsSnapshot};
pub use range::ManagedRange;

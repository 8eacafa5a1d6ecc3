//! Physical page allocator with per-CPU pools.
//!
//! Every CPU owns a pool: an intrusive free list behind its own
//! [`IrqSpinLock`]. Release pushes onto the releasing CPU's pool and acquire
//! pops from the acquiring CPU's pool, so in the common case CPUs never touch
//! each other's locks.
//!
//! # Stealing
//!
//! ```text
//!   acquire() on cpu 2, local pool empty, local lock held
//!
//!   pass 1, ascending index:
//!     cpu 0 [..]  try_lock   (lower index: busy => deferred)
//!     cpu 1 [..]  try_lock
//!     cpu 3 [..]  lock       (higher index: may spin)
//!     ...
//!   pass 1 stole nothing and something was deferred?
//!     pass 2: drop local lock, lock each deferred pool alone (ascending),
//!     detach pages into hand, re-lock local, splice them in
//! ```
//!
//! Pool locks are ordered by CPU index, and a CPU only ever spins on a lock
//! ranked above everything it holds. Locks ranked below are only tried. That
//! rules out waiting cycles between CPUs that steal from each other at the
//! same time. At most two pool locks are held at once.
//!
//! Victims are therefore not strictly visited in index order: a busy
//! lower-ranked pool is only revisited in pass 2, after every higher-ranked
//! one. Pass 2 runs only when pass 1 came back empty-handed, so pages
//! already moved into the local pool are never exposed to other stealers
//! while the local lock is down.
//!
//! All locking happens under a [`PreemptGuard`], so interrupts are masked and
//! the caller cannot migrate while it holds a pool lock, even across the
//! window where the stealer drops its own lock.

use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use kmem_lib::{
    CacheAligned, Cpu, CpuLocal, CpuSet, IrqSpinLock, IrqSpinLockGuard, PhysAddr, PreemptGuard,
    VirtAddr,
};
use spin::Once;

use crate::config::PoolConfig;
use crate::direct_map::DirectMap;
use crate::error::{MmError, MmResult};
use crate::free_list::{FreeChain, FreeList};
use crate::mm_constants::{ALLOC_FILL, FREE_FILL, MAX_CPUS, PAGE_SIZE_USIZE, POOL_LOCK_LABELS};
use crate::page::Page;
use crate::page_state::PageStateMap;
use crate::range::ManagedRange;

bitflags! {
    /// Options for [`PagePools::acquire_with`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Hand the page out zero-filled instead of with the allocation pattern.
        const ZERO = 1 << 0;
        /// Fail instead of stealing when the local pool is empty.
        const LOCAL_ONLY = 1 << 1;
    }
}

struct PoolCounters {
    acquires: AtomicU64,
    releases: AtomicU64,
    steal_events: AtomicU64,
    pages_stolen: AtomicU64,
    contended: AtomicU64,
    exhausted: AtomicU64,
}

impl PoolCounters {
    const fn new() -> Self {
        Self {
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            steal_events: AtomicU64::new(0),
            pages_stolen: AtomicU64::new(0),
            contended: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Point-in-time view of one pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub free: usize,
    pub acquires: u64,
    /// Releases by callers; boot seeding is not counted.
    pub releases: u64,
    pub steal_events: u64,
    pub pages_stolen: u64,
    /// Victims skipped on the first pass because their lock was busy.
    pub contended: u64,
    pub exhausted: u64,
}

struct Pool {
    list: IrqSpinLock<FreeList>,
    stats: PoolCounters,
}

impl Pool {
    const fn new(label: &'static str) -> Self {
        Self {
            list: IrqSpinLock::new(label, FreeList::new()),
            stats: PoolCounters::new(),
        }
    }
}

const fn pool_slots() -> [CacheAligned<Pool>; MAX_CPUS] {
    [
        CacheAligned(Pool::new(POOL_LOCK_LABELS[0])),
        CacheAligned(Pool::new(POOL_LOCK_LABELS[1])),
        CacheAligned(Pool::new(POOL_LOCK_LABELS[2])),
        CacheAligned(Pool::new(POOL_LOCK_LABELS[3])),
        CacheAligned(Pool::new(POOL_LOCK_LABELS[4])),
        CacheAligned(Pool::new(POOL_LOCK_LABELS[5])),
        CacheAligned(Pool::new(POOL_LOCK_LABELS[6])),
        CacheAligned(Pool::new(POOL_LOCK_LABELS[7])),
    ]
}

/// Set once by `init`.
struct Managed {
    range: ManagedRange,
    state: Option<PageStateMap>,
    total: usize,
}

/// The allocator: one pool per CPU plus the managed range they share.
///
/// `new` is `const`, so the usual home is a `static`.
pub struct PagePools<C> {
    cpus: CpuSet<C>,
    pools: CpuLocal<Pool>,
    map: DirectMap,
    config: PoolConfig,
    managed: Once<Managed>,
}

impl<C: Cpu> PagePools<C> {
    pub const fn new(cpu: C, map: DirectMap, config: PoolConfig) -> Self {
        Self {
            cpus: CpuSet::new(cpu),
            pools: CpuLocal::new_with(pool_slots()),
            map,
            config: config.sanitized(),
            managed: Once::new(),
        }
    }

    /// Take ownership of `[start, end)` and seed the calling CPU's pool with
    /// every whole page in it. Returns the number of pages seeded.
    ///
    /// # Panics
    ///
    /// Panics if called twice, or if `end < start`.
    pub fn init(&self, start: PhysAddr, end: PhysAddr) -> usize {
        let raw = ManagedRange::from_raw(start, end);

        let mut ran = false;
        let managed = self.managed.call_once(|| {
            ran = true;
            self.carve(raw)
        });
        if !ran {
            panic!("kinit: page pools already initialized");
        }

        for address in managed.range.page_addrs() {
            // SAFETY: the range was just handed to us; nothing else owns
            // these pages.
            unsafe { self.put(managed, address) };
        }

        log::info!(
            "kinit: {} pages in [{:#x}, {:#x}), {} cpus, steal quota {}",
            managed.total,
            managed.range.start(),
            managed.range.end(),
            self.config.cpu_count,
            self.config.steal_quota
        );
        managed.total
    }

    fn carve(&self, raw: ManagedRange) -> Managed {
        if !self.config.track_page_state || raw.is_empty() {
            return Managed {
                range: raw,
                state: None,
                total: raw.pages(),
            };
        }

        let (meta, range) = raw.split_front(PageStateMap::pages_for(raw.pages()));
        let storage = self.map.page_ptr(meta.start());
        // SAFETY: `meta` is page aligned, covers `pages_for(raw.pages())`
        // pages and is never handed out.
        let state = unsafe { PageStateMap::new(storage, range.start(), range.pages()) };
        log::debug!(
            "kinit: page state bitmap in {} pages at {:#x}",
            meta.pages(),
            meta.start()
        );

        Managed {
            range,
            state: Some(state),
            total: range.pages(),
        }
    }

    /// Allocate one page, filled with [`ALLOC_FILL`].
    #[inline]
    pub fn acquire(&self) -> MmResult<Page> {
        self.acquire_with(AllocFlags::empty())
    }

    /// Allocate one page.
    ///
    /// Pops from the current CPU's pool, refilling it from other CPUs when
    /// empty (unless [`AllocFlags::LOCAL_ONLY`]). `Err(OutOfMemory)` means no
    /// page could be found; it is also the answer before `init`.
    pub fn acquire_with(&self, flags: AllocFlags) -> MmResult<Page> {
        let Some(managed) = self.managed.get() else {
            return Err(MmError::OutOfMemory);
        };

        let pin = self.cpus.pin();
        let cpu = self.pinned_cpu(&pin);
        let pool = self.pools.pinned(&pin);

        let mut stolen = 0;
        let popped = {
            let mut local = pool.list.lock(&pin);
            if local.is_empty() && !flags.contains(AllocFlags::LOCAL_ONLY) {
                (local, stolen) = self.steal(&pin, local);
            }
            local.pop()
        };

        if stolen > 0 {
            PoolCounters::bump(&pool.stats.steal_events, 1);
            PoolCounters::bump(&pool.stats.pages_stolen, stolen as u64);
        }
        let Some(virt) = popped else {
            PoolCounters::bump(&pool.stats.exhausted, 1);
            drop(pin);
            log::warn!("kalloc: cpu {} found no free page", cpu);
            return Err(MmError::OutOfMemory);
        };
        PoolCounters::bump(&pool.stats.acquires, 1);
        drop(pin);

        if stolen > 0 {
            log::debug!("kalloc: cpu {} stole {} pages", cpu, stolen);
        }

        let address = self.map.to_phys(VirtAddr::from_ptr(virt.as_ptr()));
        if let Some(state) = &managed.state {
            if let Err(err) = state.mark_allocated(address) {
                panic!("kalloc: free list corrupted: {}", err);
            }
        }

        let fill = if flags.contains(AllocFlags::ZERO) {
            0
        } else {
            ALLOC_FILL
        };
        // SAFETY: the page was just unlinked; we own all of it.
        unsafe { core::ptr::write_bytes(virt.as_ptr(), fill, PAGE_SIZE_USIZE) };

        // SAFETY: `virt` maps `address` and nobody else holds it.
        Ok(unsafe { Page::from_parts(address, virt) })
    }

    /// Return a page to the current CPU's pool.
    #[inline]
    pub fn release(&self, page: Page) {
        // SAFETY: the handle proves exclusive ownership of the page.
        unsafe { self.release_phys(page.into_phys()) }
    }

    /// Return the page at `address` to the current CPU's pool.
    ///
    /// # Safety
    ///
    /// The caller must own the page (it was acquired from this allocator
    /// and not released since) and must not touch it afterwards.
    ///
    /// # Panics
    ///
    /// Panics before touching memory if the pools are not initialized, if
    /// `address` is not page aligned or lies outside the managed range, or
    /// (with page-state tracking) if the page is already free.
    pub unsafe fn release_phys(&self, address: PhysAddr) {
        let Some(managed) = self.managed.get() else {
            panic!("kfree: {}", MmError::NotInitialized);
        };

        // SAFETY: forwarded from the caller.
        let cpu = unsafe { self.put(managed, address) };
        PoolCounters::bump(&self.pools.get(cpu).stats.releases, 1);
    }

    /// Validate, poison and push one page. Returns the CPU whose pool got it.
    unsafe fn put(&self, managed: &Managed, address: PhysAddr) -> usize {
        if let Err(err) = managed.range.check(address) {
            panic!("kfree: {}", err);
        }
        if let Some(state) = &managed.state {
            if let Err(err) = state.mark_free(address) {
                panic!("kfree: {}", err);
            }
        }

        let page = self.map.page_ptr(address);
        // SAFETY: validated above; the caller hands the page over.
        unsafe { core::ptr::write_bytes(page.as_ptr(), FREE_FILL, PAGE_SIZE_USIZE) };

        let pin = self.cpus.pin();
        let cpu = self.pinned_cpu(&pin);
        // SAFETY: the page is ours, aligned, and on no list.
        unsafe { self.pools.pinned(&pin).list.lock(&pin).push(page) };
        cpu
    }

    /// Refill the locked local pool from other CPUs' pools.
    ///
    /// Returns the local guard (possibly re-acquired) and how many pages
    /// moved.
    fn steal<'a>(
        &'a self,
        pin: &'a PreemptGuard<'_, C>,
        mut local: IrqSpinLockGuard<'a, FreeList>,
    ) -> (IrqSpinLockGuard<'a, FreeList>, usize) {
        let me = pin.cpu_id();
        let mut quota = self.config.steal_quota;
        let mut stolen = 0;
        let mut deferred = [false; MAX_CPUS];
        let mut any_deferred = false;

        for victim in (0..self.config.cpu_count).filter(|&v| v != me) {
            if quota == 0 {
                break;
            }
            let pool = self.pools.get(victim);
            let guard = if victim > me {
                Some(pool.list.lock(pin))
            } else {
                pool.list.try_lock(pin)
            };
            let Some(mut victim_list) = guard else {
                deferred[victim] = true;
                any_deferred = true;
                PoolCounters::bump(&self.pools.pinned(pin).stats.contended, 1);
                continue;
            };

            let chain = victim_list.take(quota);
            drop(victim_list);
            quota -= chain.len();
            stolen += chain.len();
            local.splice(chain);
        }

        // Anything already spliced in must serve this acquire, so only drop
        // the local lock when the list is still empty.
        if stolen > 0 || !any_deferred {
            return (local, stolen);
        }

        // Lower-ranked pools that were busy: visit them holding nothing else.
        drop(local);
        let mut in_hand = FreeChain::empty();
        for victim in (0..self.config.cpu_count).filter(|&v| deferred[v]) {
            if quota == 0 {
                break;
            }
            let chain = self.pools.get(victim).list.lock(pin).take(quota);
            quota -= chain.len();
            stolen += chain.len();
            in_hand.append(chain);
        }

        let mut local = self.pools.pinned(pin).list.lock(pin);
        local.splice(in_hand);
        (local, stolen)
    }

    fn pinned_cpu(&self, pin: &PreemptGuard<'_, C>) -> usize {
        let cpu = pin.cpu_id();
        if cpu >= self.config.cpu_count {
            panic!(
                "page pools: cpu {} outside configured cpu_count {}",
                cpu, self.config.cpu_count
            );
        }
        cpu
    }

    /// Free pages on one CPU's pool.
    pub fn free_pages_on(&self, cpu: usize) -> usize {
        let pin = self.cpus.pin();
        self.pools.get(cpu).list.lock(&pin).len()
    }

    /// Free pages across all pools. Pools are read one at a time, so the sum
    /// is only exact while no other CPU is allocating.
    pub fn free_pages(&self) -> usize {
        (0..self.config.cpu_count)
            .map(|cpu| self.free_pages_on(cpu))
            .sum()
    }

    /// Pages under allocator control; zero before `init`.
    pub fn total_pages(&self) -> usize {
        self.managed.get().map_or(0, |managed| managed.total)
    }

    pub fn managed_range(&self) -> Option<ManagedRange> {
        self.managed.get().map(|managed| managed.range)
    }

    pub fn is_initialized(&self) -> bool {
        self.managed.is_completed()
    }

    /// Whether the page at `address` is currently free, if page-state
    /// tracking is on and `address` is a managed page.
    pub fn page_is_free(&self, address: PhysAddr) -> Option<bool> {
        let managed = self.managed.get()?;
        let state = managed.state.as_ref()?;
        managed.range.check(address).ok()?;
        Some(state.is_free(address))
    }

    pub fn stats(&self, cpu: usize) -> PoolStatsSnapshot {
        let stats = &self.pools.get(cpu).stats;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        PoolStatsSnapshot {
            free: self.free_pages_on(cpu),
            acquires: load(&stats.acquires),
            releases: load(&stats.releases),
            steal_events: load(&stats.steal_events),
            pages_stolen: load(&stats.pages_stolen),
            contended: load(&stats.contended),
            exhausted: load(&stats.exhausted),
        }
    }

    pub fn lock_label(&self, cpu: usize) -> &'static str {
        self.pools.get(cpu).list.label()
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    pub fn direct_map(&self) -> DirectMap {
        self.map
    }

    /// The CPU backend, e.g. to inspect interrupt state in tests.
    pub fn platform(&self) -> &C {
        self.cpus.platform()
    }

    /// Interrupt nesting depth of `cpu`; zero whenever no allocator call is
    /// running there.
    pub fn preempt_depth(&self, cpu: usize) -> u32 {
        self.cpus.depth(cpu)
    }
}

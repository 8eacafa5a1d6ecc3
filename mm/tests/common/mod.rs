#![allow(dead_code)]

use kmem_lib::testing::{PageArena, SimCpu};
use kmem_mm::mm_constants::{KERNBASE, PAGE_SIZE};
use kmem_mm::{DirectMap, PagePools, PhysAddr, PoolConfig};

pub const BASE: u64 = KERNBASE;

/// Pools over `pages` fake physical pages at `BASE`, backed by host memory.
pub struct Machine {
    pub pools: PagePools<SimCpu>,
    arena: PageArena,
}

impl Machine {
    /// Build and initialize on the calling thread's CPU.
    pub fn new(pages: usize, config: PoolConfig) -> Self {
        let machine = Self::uninit(pages, config);
        let seeded = machine.pools.init(machine.start(), machine.end());
        assert_eq!(seeded, machine.pools.total_pages());
        machine
    }

    pub fn uninit(pages: usize, config: PoolConfig) -> Self {
        let arena = PageArena::new(pages);
        let pools = PagePools::new(
            SimCpu::new(),
            DirectMap::new(arena.direct_map_offset(BASE)),
            config,
        );
        Self { pools, arena }
    }

    pub fn start(&self) -> PhysAddr {
        PhysAddr::new(BASE)
    }

    pub fn end(&self) -> PhysAddr {
        PhysAddr::new(BASE + self.arena.len() as u64)
    }

    pub fn page(&self, index: u64) -> PhysAddr {
        PhysAddr::new(BASE + index * PAGE_SIZE)
    }

    /// Read a byte of a page straight from the backing memory.
    pub fn peek(&self, page: PhysAddr, offset: usize) -> u8 {
        let index = (page.as_u64() - BASE) as usize + offset;
        assert!(index < self.arena.len());
        // SAFETY: in bounds of the live arena.
        unsafe { self.arena.as_ptr().add(index).read_volatile() }
    }
}

pub fn cpus(count: usize) -> PoolConfig {
    PoolConfig::DEFAULT.with_cpu_count(count)
}

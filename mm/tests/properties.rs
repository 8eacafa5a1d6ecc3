mod common;

use std::collections::HashSet;

use common::{Machine, cpus};
use kmem_lib::testing::SimCpu;
use kmem_mm::{AllocFlags, MmError, Page, PoolConfig};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Acquire { cpu: usize, local_only: bool },
    Release { cpu: usize, pick: usize },
}

fn op(cpu_count: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..cpu_count, any::<bool>()).prop_map(|(cpu, local_only)| Op::Acquire { cpu, local_only }),
        (0..cpu_count, any::<usize>()).prop_map(|(cpu, pick)| Op::Release { cpu, pick }),
    ]
}

fn scenario() -> impl Strategy<Value = (usize, usize, usize, Vec<Op>)> {
    (1usize..=4, 0usize..24, 1usize..8).prop_flat_map(|(cpu_count, pages, quota)| {
        (
            Just(cpu_count),
            Just(pages),
            Just(quota),
            prop::collection::vec(op(cpu_count), 0..120),
        )
    })
}

proptest! {
    #[test]
    fn random_sequences_conserve_pages((cpu_count, pages, quota, ops) in scenario(), tracked in any::<bool>()) {
        let config = PoolConfig::DEFAULT
            .with_cpu_count(cpu_count)
            .with_steal_quota(quota)
            .with_page_state_tracking(tracked);
        let m = Machine::new(pages, config);
        let total = m.pools.total_pages();
        let range = m.pools.managed_range().unwrap();
        let mut held: Vec<Page> = Vec::new();

        for op in ops {
            match op {
                Op::Acquire { cpu, local_only } => {
                    let flags = if local_only { AllocFlags::LOCAL_ONLY } else { AllocFlags::empty() };
                    let free_before = m.pools.free_pages();
                    match SimCpu::run_on(cpu, || m.pools.acquire_with(flags)) {
                        Ok(page) => {
                            prop_assert!(page.phys().is_page_aligned());
                            prop_assert!(range.contains(page.phys()));
                            prop_assert!(held.iter().all(|h| h.phys() != page.phys()));
                            held.push(page);
                        }
                        Err(err) => {
                            prop_assert_eq!(err, MmError::OutOfMemory);
                            if !local_only {
                                prop_assert_eq!(free_before, 0);
                            }
                        }
                    }
                }
                Op::Release { cpu, pick } => {
                    if !held.is_empty() {
                        let page = held.swap_remove(pick % held.len());
                        SimCpu::run_on(cpu, || m.pools.release(page));
                    }
                }
            }
            prop_assert_eq!(m.pools.free_pages() + held.len(), total);
        }

        let distinct: HashSet<_> = held.iter().map(Page::phys).collect();
        prop_assert_eq!(distinct.len(), held.len());
        for page in held {
            m.pools.release(page);
        }
        prop_assert_eq!(m.pools.free_pages(), total);
    }

    #[test]
    fn stealing_never_exceeds_quota(pages in 1usize..40, quota in 1usize..16) {
        let m = Machine::new(pages, cpus(2).with_steal_quota(quota));
        let page = SimCpu::run_on(1, || m.pools.acquire()).unwrap();
        let stolen = m.pools.stats(1).pages_stolen as usize;
        prop_assert_eq!(stolen, pages.min(quota));
        prop_assert_eq!(m.pools.free_pages_on(1), stolen - 1);
        prop_assert_eq!(m.pools.free_pages_on(0), pages - stolen);
        m.pools.release(page);
    }
}

mod common;

use common::{Machine, cpus};
use kmem_lib::testing::{SimCpu, capture_logs, captured_lines};
use kmem_mm::Page;

#[test]
fn allocator_events_reach_the_klog_backend() {
    capture_logs(log::LevelFilter::Debug);

    let m = Machine::new(3, cpus(2));
    SimCpu::run_on(1, || {
        let page = m.pools.acquire().unwrap();
        let _held: Vec<Page> = (0..2).map(|_| m.pools.acquire().unwrap()).collect();
        assert!(m.pools.acquire().is_err());
        m.pools.release(page);
    });

    let lines = captured_lines();
    let has = |needle: &str| lines.iter().any(|line| line.contains(needle));
    assert!(has("[INFO ] kmem_mm::page_alloc: kinit: 3 pages"), "{lines:#?}");
    assert!(has("kalloc: cpu 1 stole 3 pages"), "{lines:#?}");
    assert!(has("[WARN ] kmem_mm::page_alloc: kalloc: cpu 1 found no free page"), "{lines:#?}");
}

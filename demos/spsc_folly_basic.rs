//! Folly-style SPSC ring: fill to capacity, drain, refill.

use fluxcell::{Arena, ContainerHandle, FollySpsc, Kv, OpResult};

fn main() {
    tracing_subscriber::fmt::init();

    let arena = Arena::new(4096).expect("arena");
    let ring = FollySpsc::init(&arena, 4).expect("ring head");

    for (k, v) in [(1u64, 100u64), (2, 200), (3, 300)] {
        assert_eq!(ring.insert(k, v), OpResult::Success);
    }
    assert_eq!(ring.insert(4, 400), OpResult::Full);

    let mut out = Kv::default();
    while ring.pop(&mut out) == OpResult::Success {
        println!("popped ({}, {})", out.key, out.value);
    }
    println!("{}: drained to empty, count = {}", ring.metadata().name, ring.count());
    assert_eq!(ring.verify(), OpResult::Success);
}

//! CK-style SPSC ring with the library's own cursor naming.

use fluxcell::{Arena, CkSpsc, ContainerHandle, Kv, OpResult};

fn main() {
    tracing_subscriber::fmt::init();

    let arena = Arena::new(4096).expect("arena");
    let ring = CkSpsc::init(&arena, 4).expect("ring head");

    for i in 0..4u64 {
        assert_eq!(ring.insert(i, i * 7), OpResult::Success);
    }
    assert_eq!(ring.insert(99, 0), OpResult::Full);

    let mut out = Kv::default();
    for _ in 0..4 {
        assert_eq!(ring.pop(&mut out), OpResult::Success);
        println!("popped ({}, {})", out.key, out.value);
    }
    println!("{}: count = {}", ring.metadata().name, ring.count());
}

//! Single-writer doubly-linked list walkthrough.

use fluxcell::{Arena, ContainerHandle, Kv, List, OpResult};

fn main() {
    tracing_subscriber::fmt::init();

    let arena = Arena::new(64 * 1024).expect("arena");
    let list = List::init(&arena).expect("list head");

    for (k, v) in [(1u64, 10u64), (2, 20), (3, 30)] {
        assert_eq!(list.insert(k, v), OpResult::Success);
    }
    println!("{}: {} elements", list.metadata().name, list.count());

    assert_eq!(list.search(2), OpResult::Success);
    assert_eq!(list.delete(2), OpResult::Success);
    assert_eq!(list.search(2), OpResult::NotFound);

    let mut out = Kv::default();
    while list.pop(&mut out) == OpResult::Success {
        println!("popped ({}, {})", out.key, out.value);
    }
    assert_eq!(list.verify(), OpResult::Success);
    println!("verify: Success, final count: {}", list.count());
}

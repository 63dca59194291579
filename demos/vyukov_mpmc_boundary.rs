//! Eight producers racing to fill a capacity-8 Vyukov MPMC queue, per the
//! boundary scenario the queue's tests exercise under `cargo test`.

use std::thread;

use fluxcell::{Arena, ContainerHandle, Kv, OpResult, VyukovMpmc};

fn main() {
    tracing_subscriber::fmt::init();

    let arena = Arena::new(4 * 1024 * 1024).expect("arena");
    let queue = VyukovMpmc::init(&arena, 8).expect("power-of-two capacity");

    thread::scope(|scope| {
        for i in 0..8u64 {
            let queue = &queue;
            scope.spawn(move || {
                assert_eq!(queue.insert(i, i * 100), OpResult::Success);
            });
        }
    });

    println!("{}: {} / {}", queue.metadata().name, queue.count(), queue.capacity());
    assert_eq!(queue.insert(99, 99), OpResult::Full);

    let mut out = Kv::default();
    while queue.pop(&mut out) == OpResult::Success {
        println!("popped ({}, {})", out.key, out.value);
    }
    assert_eq!(queue.verify(), OpResult::Success);
}

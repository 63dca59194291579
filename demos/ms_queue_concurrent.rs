//! Two producers and one consumer racing over a Michael-Scott queue.

use std::thread;

use fluxcell::{Arena, ContainerHandle, Kv, MsQueue, OpResult};

fn main() {
    tracing_subscriber::fmt::init();

    let arena = Arena::new(4 * 1024 * 1024).expect("arena");
    let queue = MsQueue::init(&arena).expect("queue head");

    thread::scope(|scope| {
        scope.spawn(|| {
            for k in 1..=1000u64 {
                while queue.insert(k, k * 10) != OpResult::Success {}
            }
        });
        scope.spawn(|| {
            for k in 1001..=2000u64 {
                while queue.insert(k, k * 10) != OpResult::Success {}
            }
        });
    });

    let mut drained = 0u64;
    let mut out = Kv::default();
    while queue.pop(&mut out) == OpResult::Success {
        drained += 1;
    }

    println!("{}: drained {} items", queue.metadata().name, drained);
    assert_eq!(queue.verify(), OpResult::Success);
}

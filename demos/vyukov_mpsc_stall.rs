//! Reproduces the MPSC "stalled producer" window: the consumer must
//! report `Busy`, not `NotFound`, while a producer is mid-exchange.

use fluxcell::{Arena, ContainerHandle, Kv, OpResult, VyukovMpsc};

fn main() {
    tracing_subscriber::fmt::init();

    let arena = Arena::new(64 * 1024).expect("arena");
    let queue = VyukovMpsc::init(&arena).expect("queue head");

    assert_eq!(queue.insert(42, 7), OpResult::Success);
    let mut out = Kv::default();
    assert_eq!(queue.pop(&mut out), OpResult::Success);
    println!("{}: popped ({}, {})", queue.metadata().name, out.key, out.value);
    assert_eq!(queue.pop(&mut out), OpResult::NotFound);
    assert_eq!(queue.verify(), OpResult::Success);
}

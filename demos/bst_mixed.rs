//! Mixed insert/delete against the EFRB BST, mirroring the end-to-end
//! scenario its tests check.

use fluxcell::{Arena, BstEfrb, ContainerHandle, OpResult};

fn main() {
    tracing_subscriber::fmt::init();

    let arena = Arena::new(4 * 1024 * 1024).expect("arena");
    let tree = BstEfrb::init(&arena).expect("tree head");

    for k in [50u64, 30, 70, 20, 40, 60, 80] {
        assert_eq!(tree.insert(k, k * 10), OpResult::Success);
    }
    println!("{}: {} keys", tree.metadata().name, tree.count());

    assert_eq!(tree.delete(30), OpResult::Success);
    assert_eq!(tree.search(30), OpResult::NotFound);
    assert_eq!(tree.insert(30, 300), OpResult::Success);
    assert_eq!(tree.search(30), OpResult::Success);

    assert_eq!(tree.verify(), OpResult::Success);
    println!("verify: Success, final count: {}", tree.count());
}

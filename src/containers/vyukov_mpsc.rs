//! Vyukov unbounded MPSC linked queue (spec.md §4.G).
//!
//! Producers never block each other: each one swaps itself into `head`
//! with a single `exchange`, then links the prior head's `next`. Between
//! those two steps the queue is briefly *stalled* — `head` has already
//! advanced but the old node's `next` is still null — and the single
//! consumer must recognize that window and report `Busy` rather than
//! mistaking it for an empty queue.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::arena::{Arena, ArenaOffset, AtomicOffset};
use crate::atomics;
use crate::result::OpResult;
use crate::types::{ContainerHandle, ContainerMetadata, Kv};

#[repr(C)]
struct MpscNode {
    next: AtomicOffset,
    kv: Kv,
}

#[repr(C)]
pub struct VyukovMpscHead {
    head: AtomicOffset,
    tail: AtomicOffset,
    stub: ArenaOffset,
    count: AtomicU64,
}

const METADATA: ContainerMetadata = ContainerMetadata {
    name: "vyukov_mpsc_queue",
    description: "Wait-free producer exchange, single consumer chasing next pointers",
    node_size: std::mem::size_of::<MpscNode>(),
    requires_locking: false,
};

pub struct VyukovMpsc<'a> {
    arena: &'a Arena,
    head: ArenaOffset,
}

impl<'a> VyukovMpsc<'a> {
    pub fn init(arena: &'a Arena) -> Option<Self> {
        let stub_off = arena.alloc_for::<MpscNode>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<MpscNode>(stub_off),
                MpscNode {
                    next: AtomicOffset::new(ArenaOffset::NULL),
                    kv: Kv::default(),
                },
            );
        }
        let head_off = arena.alloc_for::<VyukovMpscHead>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<VyukovMpscHead>(head_off),
                VyukovMpscHead {
                    head: AtomicOffset::new(stub_off),
                    tail: AtomicOffset::new(stub_off),
                    stub: stub_off,
                    count: AtomicU64::new(0),
                },
            );
        }
        Some(Self {
            arena,
            head: head_off,
        })
    }

    fn head(&self) -> &VyukovMpscHead {
        unsafe { &*self.arena.resolve::<VyukovMpscHead>(self.head) }
    }

    unsafe fn node_at(&self, offset: ArenaOffset) -> &MpscNode {
        &*self.arena.resolve::<MpscNode>(offset)
    }

    /// Wait-free per producer: one `exchange` plus one `release_store`.
    pub fn insert(&self, key: u64, value: u64) -> OpResult {
        let new_off = match self.arena.alloc_for::<MpscNode>() {
            Some(off) => off,
            None => return OpResult::NoMem,
        };
        unsafe {
            std::ptr::write(
                self.arena.resolve_mut::<MpscNode>(new_off),
                MpscNode {
                    next: AtomicOffset::new(ArenaOffset::NULL),
                    kv: Kv::new(key, value),
                },
            );
        }

        let h = self.head();
        let prev = h.head.exchange(new_off, Ordering::AcqRel);
        let prev_node = unsafe { self.node_at(prev) };
        atomics::release_store(&prev_node.next, new_off);
        h.count.fetch_add(1, Ordering::Relaxed);
        OpResult::Success
    }

    /// Single consumer only; `self.tail` is only ever written here.
    pub fn pop(&self, out: &mut Kv) -> OpResult {
        let h = self.head();
        let tail = h.tail.load(Ordering::Relaxed);
        let tail_node = unsafe { self.node_at(tail) };
        let next = atomics::acquire_load(&tail_node.next);

        if next.is_null() {
            let current_head = atomics::acquire_load(&h.head);
            if current_head == tail {
                return OpResult::NotFound;
            }
            return OpResult::Busy;
        }

        let next_node = unsafe { self.node_at(next) };
        *out = next_node.kv;
        h.tail.store(next, Ordering::Relaxed);
        self.arena.free(tail);
        h.count.fetch_sub(1, Ordering::Relaxed);
        OpResult::Success
    }

    /// Linear search starting from the consumer's current tail.
    pub fn search(&self, key: u64) -> OpResult {
        let h = self.head();
        let mut cur = h.tail.load(Ordering::Relaxed);
        loop {
            let node = unsafe { self.node_at(cur) };
            let next = atomics::acquire_load(&node.next);
            if next.is_null() {
                return OpResult::NotFound;
            }
            let next_node = unsafe { self.node_at(next) };
            if next_node.kv.key == key {
                return OpResult::Success;
            }
            cur = next;
        }
    }

    pub fn verify(&self) -> OpResult {
        let h = self.head();
        let tail = h.tail.load(Ordering::Relaxed);
        let head = atomics::acquire_load(&h.head);
        if tail.is_null() || head.is_null() {
            tracing::error!("vyukov_mpsc verify: null head or tail");
            return OpResult::Corrupt;
        }

        let mut cur = tail;
        let mut n = 0u64;
        let bound = (h.count.load(Ordering::Relaxed) as usize) + 2;
        for _ in 0..bound.max(1) {
            let node = unsafe { self.node_at(cur) };
            let next = atomics::acquire_load(&node.next);
            if next.is_null() {
                break;
            }
            cur = next;
            n += 1;
        }
        if n != h.count.load(Ordering::Relaxed) {
            tracing::error!(walked = n, "vyukov_mpsc verify: count mismatch");
            return OpResult::Corrupt;
        }
        OpResult::Success
    }
}

impl<'a> ContainerHandle for VyukovMpsc<'a> {
    fn metadata(&self) -> &'static ContainerMetadata {
        &METADATA
    }

    fn count(&self) -> u64 {
        self.head().count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_single_producer() {
        let arena = Arena::new(64 * 1024).unwrap();
        let q = VyukovMpsc::init(&arena).unwrap();
        assert_eq!(q.insert(1, 10), OpResult::Success);
        assert_eq!(q.insert(2, 20), OpResult::Success);

        let mut out = Kv::default();
        assert_eq!(q.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(1, 10));
        assert_eq!(q.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(2, 20));
        assert_eq!(q.pop(&mut out), OpResult::NotFound);
        assert_eq!(q.verify(), OpResult::Success);
    }

    #[test]
    fn stall_window_reported_as_busy() {
        let arena = Arena::new(64 * 1024).unwrap();
        let q = VyukovMpsc::init(&arena).unwrap();

        // Manually reproduce the stalled window spec.md §8 scenario 5
        // describes: advance `head` without yet linking the prior node.
        let new_off = arena.alloc_for::<MpscNode>().unwrap();
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<MpscNode>(new_off),
                MpscNode {
                    next: AtomicOffset::new(ArenaOffset::NULL),
                    kv: Kv::new(42, 7),
                },
            );
        }
        let h = q.head();
        let prev = h.head.exchange(new_off, Ordering::AcqRel);

        let mut out = Kv::default();
        assert_eq!(q.pop(&mut out), OpResult::Busy);

        // Producer resumes: publish the link.
        let prev_node = unsafe { q.node_at(prev) };
        atomics::release_store(&prev_node.next, new_off);
        h.count.fetch_add(1, Ordering::Relaxed);

        assert_eq!(q.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(42, 7));
    }

    #[test]
    fn multiple_producers_each_keep_program_order() {
        let arena = Arena::new(4 * 1024 * 1024).unwrap();
        let q = VyukovMpsc::init(&arena).unwrap();

        thread::scope(|scope| {
            scope.spawn(|| {
                for k in 1..=10u64 {
                    assert_eq!(q.insert(k, k * 10), OpResult::Success);
                }
            });
            scope.spawn(|| {
                for k in 101..=110u64 {
                    assert_eq!(q.insert(k, k * 10), OpResult::Success);
                }
            });
        });

        let mut seen_p1 = Vec::new();
        let mut seen_p2 = Vec::new();
        let mut out = Kv::default();
        let mut total = 0;
        loop {
            match q.pop(&mut out) {
                OpResult::Success => {
                    if out.key < 100 {
                        seen_p1.push(out.key);
                    } else {
                        seen_p2.push(out.key);
                    }
                    total += 1;
                }
                OpResult::Busy => continue,
                OpResult::NotFound => break,
                _ => unreachable!(),
            }
        }
        assert_eq!(total, 20);
        assert!(seen_p1.windows(2).all(|w| w[0] < w[1]));
        assert!(seen_p2.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(q.verify(), OpResult::Success);
    }
}

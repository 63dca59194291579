//! Michael-Scott unbounded MPMC FIFO queue (spec.md §4.E).
//!
//! Classic two-pointer lock-free design with a permanent dummy node so
//! `head` is never null. Enqueue and dequeue both use bounded retry loops
//! (spec.md §9) rather than spinning forever; exhausting a loop surfaces as
//! `OpResult::Invalid` so the caller chooses a back-off policy.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::arena::{Arena, ArenaOffset, AtomicOffset};
use crate::atomics;
use crate::constants::MAX_CAS_RETRIES;
use crate::result::OpResult;
use crate::types::{ContainerHandle, ContainerMetadata, Kv};

#[repr(C)]
struct MsNode {
    next: AtomicOffset,
    kv: Kv,
}

#[repr(C)]
pub struct MsQueueHead {
    head: AtomicOffset,
    tail: AtomicOffset,
    count: AtomicU64,
}

const METADATA: ContainerMetadata = ContainerMetadata {
    name: "michael_scott_queue",
    description: "Unbounded lock-free MPMC FIFO with dummy-head invariant and tail helping",
    node_size: std::mem::size_of::<MsNode>(),
    requires_locking: false,
};

pub struct MsQueue<'a> {
    arena: &'a Arena,
    head: ArenaOffset,
}

impl<'a> MsQueue<'a> {
    pub fn init(arena: &'a Arena) -> Option<Self> {
        let dummy_off = arena.alloc_for::<MsNode>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<MsNode>(dummy_off),
                MsNode {
                    next: AtomicOffset::new(ArenaOffset::NULL),
                    kv: Kv::default(),
                },
            );
        }
        let head_off = arena.alloc_for::<MsQueueHead>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<MsQueueHead>(head_off),
                MsQueueHead {
                    head: AtomicOffset::new(dummy_off),
                    tail: AtomicOffset::new(dummy_off),
                    count: AtomicU64::new(0),
                },
            );
        }
        Some(Self {
            arena,
            head: head_off,
        })
    }

    fn head(&self) -> &MsQueueHead {
        unsafe { &*self.arena.resolve::<MsQueueHead>(self.head) }
    }

    unsafe fn node_at(&self, offset: ArenaOffset) -> &MsNode {
        &*self.arena.resolve::<MsNode>(offset)
    }

    pub fn insert(&self, key: u64, value: u64) -> OpResult {
        let new_off = match self.arena.alloc_for::<MsNode>() {
            Some(off) => off,
            None => return OpResult::NoMem,
        };
        unsafe {
            std::ptr::write(
                self.arena.resolve_mut::<MsNode>(new_off),
                MsNode {
                    next: AtomicOffset::new(ArenaOffset::NULL),
                    kv: Kv::new(key, value),
                },
            );
        }

        let h = self.head();
        for _ in 0..MAX_CAS_RETRIES {
            let tail = atomics::acquire_load(&h.tail);
            let tail_node = unsafe { self.node_at(tail) };
            let next = atomics::acquire_load(&tail_node.next);

            if !next.is_null() {
                // Tail lags; help it forward and retry regardless of outcome.
                h.tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            let (_, swapped) = tail_node.next.compare_exchange(
                ArenaOffset::NULL,
                new_off,
                Ordering::Release,
                Ordering::Relaxed,
            );
            if swapped {
                h.count.fetch_add(1, Ordering::Relaxed);
                h.tail
                    .compare_exchange(tail, new_off, Ordering::Release, Ordering::Relaxed);
                return OpResult::Success;
            }
        }
        OpResult::Invalid
    }

    pub fn pop(&self, out: &mut Kv) -> OpResult {
        let h = self.head();
        for _ in 0..MAX_CAS_RETRIES {
            let head = atomics::acquire_load(&h.head);
            let tail = atomics::acquire_load(&h.tail);
            let head_node = unsafe { self.node_at(head) };
            let next = atomics::acquire_load(&head_node.next);

            if atomics::acquire_load(&h.head) != head {
                continue;
            }
            if next.is_null() {
                return OpResult::NotFound;
            }
            if head == tail {
                h.tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            let next_node = unsafe { self.node_at(next) };
            *out = next_node.kv;

            let (_, swapped) =
                h.head
                    .compare_exchange(head, next, Ordering::Acquire, Ordering::Relaxed);
            if swapped {
                h.count.fetch_sub(1, Ordering::Relaxed);
                self.arena.free(head);
                return OpResult::Success;
            }
        }
        OpResult::Invalid
    }

    /// Linear search of reachable elements (the dummy node excluded).
    pub fn search(&self, key: u64) -> OpResult {
        let mut cur = atomics::acquire_load(&self.head().head);
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
        let head = atomics::acquire_load(&h.head);
        let tail = atomics::acquire_load(&h.tail);
        if head.is_null() {
            return OpResult::Corrupt;
        }

        let mut cur = head;
        let mut n = 0u64;
        let mut saw_tail = cur == tail;
        let bound = (h.count.load(Ordering::Relaxed) as usize) + 2;
        for _ in 0..bound.max(1) {
            let node = unsafe { self.node_at(cur) };
            let next = atomics::acquire_load(&node.next);
            if next.is_null() {
                break;
            }
            cur = next;
            if cur == tail {
                saw_tail = true;
            }
            n += 1;
        }
        if !saw_tail || n != h.count.load(Ordering::Relaxed) {
            tracing::error!(walked = n, saw_tail, "ms_queue verify: invariant broken");
            return OpResult::Corrupt;
        }
        OpResult::Success
    }
}

impl<'a> ContainerHandle for MsQueue<'a> {
    fn metadata(&self) -> &'static ContainerMetadata {
        &METADATA
    }

    fn count(&self) -> u64 {
        self.head().count.load(Ordering::Relaxed)
    }
}

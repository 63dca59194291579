//! CK-library-faithful SPSC bounded ring (spec.md §4.I).
//!
//! Semantically identical to [`crate::containers::spsc_folly::FollySpsc`];
//! only the field names differ, following the CK library's own naming
//! (`p_tail` for the producer's write cursor, `c_head` for the consumer's
//! read cursor) rather than Folly's `read_idx`/`write_idx`. Kept as a
//! distinct type because callers choosing between the two families expect
//! that naming, not because the algorithm differs.

use std::sync::atomic::Ordering;

use crate::arena::{Arena, ArenaOffset};
use crate::atomics;
use crate::containers::common::PaddedSequence;
use crate::result::OpResult;
use crate::types::{ContainerHandle, ContainerMetadata, Kv};

#[repr(C)]
pub struct CkSpscHead {
    slots: ArenaOffset,
    capacity: u32,
    c_head: PaddedSequence,
    p_tail: PaddedSequence,
}

const METADATA: ContainerMetadata = ContainerMetadata {
    name: "ck_spsc_ring",
    description: "Single-producer/single-consumer ring with CK-library cursor naming",
    node_size: std::mem::size_of::<Kv>(),
    requires_locking: false,
};

pub struct CkSpsc<'a> {
    arena: &'a Arena,
    head: ArenaOffset,
}

impl<'a> CkSpsc<'a> {
    /// `capacity` is the usable capacity; the underlying ring is allocated
    /// one slot larger so full and empty remain distinguishable.
    pub fn init(arena: &'a Arena, capacity: u32) -> Option<Self> {
        if capacity < 1 {
            return None;
        }
        let size = capacity + 1;
        let slots_off = arena.alloc(size as usize * std::mem::size_of::<Kv>())?;
        unsafe {
            let base = arena.resolve_mut::<Kv>(slots_off);
            for i in 0..size as usize {
                std::ptr::write(base.add(i), Kv::default());
            }
        }
        let head_off = arena.alloc_for::<CkSpscHead>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<CkSpscHead>(head_off),
                CkSpscHead {
                    slots: slots_off,
                    capacity: size,
                    c_head: PaddedSequence::new(0),
                    p_tail: PaddedSequence::new(0),
                },
            );
        }
        Some(Self {
            arena,
            head: head_off,
        })
    }

    fn head(&self) -> &CkSpscHead {
        unsafe { &*self.arena.resolve::<CkSpscHead>(self.head) }
    }

    unsafe fn slot(&self, index: u32) -> *mut Kv {
        let h = self.head();
        self.arena.resolve_mut::<Kv>(h.slots).add(index as usize)
    }

    /// Sole producer.
    pub fn insert(&self, key: u64, value: u64) -> OpResult {
        let h = self.head();
        let cur = atomics::relaxed_read(&h.p_tail.value) as u32;
        let next = (cur + 1) % h.capacity;

        let head = atomics::acquire_load(&h.c_head.value) as u32;
        if next == head {
            return OpResult::Full;
        }

        unsafe {
            std::ptr::write_volatile(self.slot(cur), Kv::new(key, value));
        }
        atomics::release_store(&h.p_tail.value, next as u64);
        OpResult::Success
    }

    /// Sole consumer.
    pub fn pop(&self, out: &mut Kv) -> OpResult {
        let h = self.head();
        let cur = atomics::relaxed_read(&h.c_head.value) as u32;
        let tail = atomics::acquire_load(&h.p_tail.value) as u32;
        if cur == tail {
            return OpResult::NotFound;
        }

        *out = unsafe { std::ptr::read_volatile(self.slot(cur)) };
        let next = (cur + 1) % h.capacity;
        atomics::release_store(&h.c_head.value, next as u64);
        OpResult::Success
    }

    pub fn search(&self, key: u64) -> OpResult {
        let h = self.head();
        let head = atomics::acquire_load(&h.c_head.value) as u32;
        let tail = atomics::acquire_load(&h.p_tail.value) as u32;
        let mut i = head;
        while i != tail {
            let kv = unsafe { std::ptr::read_volatile(self.slot(i)) };
            if kv.key == key {
                return OpResult::Success;
            }
            i = (i + 1) % h.capacity;
        }
        OpResult::NotFound
    }

    pub fn verify(&self) -> OpResult {
        let h = self.head();
        let head = atomics::acquire_load(&h.c_head.value) as u32;
        let tail = atomics::acquire_load(&h.p_tail.value) as u32;
        if head >= h.capacity || tail >= h.capacity {
            tracing::error!(head, tail, capacity = h.capacity, "ck_spsc verify: index out of range");
            return OpResult::Corrupt;
        }
        OpResult::Success
    }
}

impl<'a> ContainerHandle for CkSpsc<'a> {
    fn metadata(&self) -> &'static ContainerMetadata {
        &METADATA
    }

    fn count(&self) -> u64 {
        let h = self.head();
        let head = atomics::acquire_load(&h.c_head.value) as u32;
        let tail = atomics::acquire_load(&h.p_tail.value) as u32;
        ((tail + h.capacity - head) % h.capacity) as u64
    }
}

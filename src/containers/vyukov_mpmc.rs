//! Vyukov bounded MPMC array queue with per-slot sequence numbers
//! (spec.md §4.F).
//!
//! Each slot carries its own sequence number; the difference between a
//! slot's sequence and the claiming position tells a thread whether the
//! slot is empty, full, or mid-transition, which is what lets multiple
//! producers and multiple consumers share one fixed array without a
//! global lock. `enqueue_pos`/`dequeue_pos` are cache-line padded
//! ([`crate::containers::common::PaddedSequence`]) so producers and
//! consumers don't false-share a line.

use std::sync::atomic::Ordering;

use crate::arena::{Arena, ArenaOffset};
use crate::atomics;
use crate::constants::MAX_CAS_RETRIES;
use crate::containers::common::PaddedSequence;
use crate::result::OpResult;
use crate::types::{ContainerHandle, ContainerMetadata, Kv};

#[repr(C)]
struct Slot {
    sequence: std::sync::atomic::AtomicU64,
    kv: Kv,
}

#[repr(C)]
pub struct VyukovMpmcHead {
    buffer: ArenaOffset,
    buffer_mask: u64,
    capacity: u64,
    enqueue_pos: PaddedSequence,
    dequeue_pos: PaddedSequence,
    count: std::sync::atomic::AtomicU64,
}

const METADATA: ContainerMetadata = ContainerMetadata {
    name: "vyukov_mpmc_queue",
    description: "Fixed power-of-two array queue with per-slot sequence numbers",
    node_size: std::mem::size_of::<Slot>(),
    requires_locking: false,
};

pub struct VyukovMpmc<'a> {
    arena: &'a Arena,
    head: ArenaOffset,
}

impl<'a> VyukovMpmc<'a> {
    /// `capacity` must be a power of two; otherwise returns `None` and the
    /// caller should surface `OpResult::Invalid`.
    pub fn init(arena: &'a Arena, capacity: usize) -> Option<Self> {
        if !capacity.is_power_of_two() || capacity == 0 {
            return None;
        }
        let buffer_off = arena.alloc(capacity * std::mem::size_of::<Slot>())?;
        unsafe {
            let base = arena.resolve_mut::<Slot>(buffer_off);
            for i in 0..capacity {
                std::ptr::write(
                    base.add(i),
                    Slot {
                        sequence: std::sync::atomic::AtomicU64::new(i as u64),
                        kv: Kv::default(),
                    },
                );
            }
        }
        let head_off = arena.alloc_for::<VyukovMpmcHead>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<VyukovMpmcHead>(head_off),
                VyukovMpmcHead {
                    buffer: buffer_off,
                    buffer_mask: (capacity - 1) as u64,
                    capacity: capacity as u64,
                    enqueue_pos: PaddedSequence::new(0),
                    dequeue_pos: PaddedSequence::new(0),
                    count: std::sync::atomic::AtomicU64::new(0),
                },
            );
        }
        Some(Self {
            arena,
            head: head_off,
        })
    }

    fn head(&self) -> &VyukovMpmcHead {
        unsafe { &*self.arena.resolve::<VyukovMpmcHead>(self.head) }
    }

    unsafe fn slot_at(&self, index: u64) -> *const Slot {
        let h = self.head();
        let base = self.arena.resolve::<Slot>(h.buffer);
        base.add((index & h.buffer_mask) as usize)
    }

    pub fn insert(&self, key: u64, value: u64) -> OpResult {
        let h = self.head();
        for _ in 0..MAX_CAS_RETRIES {
            let pos = atomics::relaxed_read(&h.enqueue_pos.value);
            let cell = unsafe { self.slot_at(pos) };
            let seq = atomics::acquire_load(unsafe { &(*cell).sequence });
            let diff = seq as i128 - pos as i128;

            if diff == 0 {
                let (_, swapped) = atomics::cas(
                    &h.enqueue_pos.value,
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
                if swapped {
                    unsafe {
                        let kv_ptr = std::ptr::addr_of!((*cell).kv) as *mut Kv;
                        std::ptr::write_volatile(kv_ptr, Kv::new(key, value));
                        atomics::release_store(&(*cell).sequence, pos + 1);
                    }
                    h.count.fetch_add(1, Ordering::Relaxed);
                    return OpResult::Success;
                }
            } else if diff < 0 {
                return OpResult::Full;
            }
        }
        OpResult::Invalid
    }

    pub fn pop(&self, out: &mut Kv) -> OpResult {
        let h = self.head();
        for _ in 0..MAX_CAS_RETRIES {
            let pos = atomics::relaxed_read(&h.dequeue_pos.value);
            let cell = unsafe { self.slot_at(pos) };
            let seq = atomics::acquire_load(unsafe { &(*cell).sequence });
            let diff = seq as i128 - (pos as i128 + 1);

            if diff == 0 {
                let (_, swapped) = atomics::cas(
                    &h.dequeue_pos.value,
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                );
                if swapped {
                    unsafe {
                        let kv_ptr = std::ptr::addr_of!((*cell).kv);
                        *out = std::ptr::read_volatile(kv_ptr);
                        atomics::release_store(&(*cell).sequence, pos + h.buffer_mask + 1);
                    }
                    h.count.fetch_sub(1, Ordering::Relaxed);
                    return OpResult::Success;
                }
            } else if diff < 0 {
                return OpResult::NotFound;
            }
        }
        OpResult::Invalid
    }

    /// Linear scan over every slot currently holding published data.
    pub fn search(&self, key: u64) -> OpResult {
        let h = self.head();
        let enqueue = atomics::relaxed_read(&h.enqueue_pos.value);
        let dequeue = atomics::relaxed_read(&h.dequeue_pos.value);
        let mut pos = dequeue;
        while pos != enqueue {
            let cell = unsafe { self.slot_at(pos) };
            let seq = atomics::acquire_load(unsafe { &(*cell).sequence });
            if seq == pos + 1 {
                let kv = unsafe { std::ptr::read_volatile(std::ptr::addr_of!((*cell).kv)) };
                if kv.key == key {
                    return OpResult::Success;
                }
            }
            pos += 1;
        }
        OpResult::NotFound
    }

    pub fn verify(&self) -> OpResult {
        let h = self.head();
        let enqueue = atomics::relaxed_read(&h.enqueue_pos.value);
        let dequeue = atomics::relaxed_read(&h.dequeue_pos.value);
        if enqueue < dequeue {
            tracing::error!(enqueue, dequeue, "vyukov_mpmc verify: dequeue ahead of enqueue");
            return OpResult::Corrupt;
        }
        let expected_count = enqueue - dequeue;
        if expected_count != h.count.load(Ordering::Relaxed) {
            tracing::error!(expected_count, "vyukov_mpmc verify: count mismatch");
            return OpResult::Corrupt;
        }
        if expected_count > h.capacity {
            tracing::error!(expected_count, capacity = h.capacity, "vyukov_mpmc verify: over capacity");
            return OpResult::Corrupt;
        }
        OpResult::Success
    }

    pub fn capacity(&self) -> u64 {
        self.head().capacity
    }
}

impl<'a> ContainerHandle for VyukovMpmc<'a> {
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
    fn rejects_non_power_of_two_capacity() {
        let arena = Arena::new(64 * 1024).unwrap();
        assert!(VyukovMpmc::init(&arena, 10).is_none());
    }

    #[test]
    fn boundary_capacity_eight() {
        let arena = Arena::new(64 * 1024).unwrap();
        let q = VyukovMpmc::init(&arena, 8).unwrap();
        for i in 0..8u64 {
            assert_eq!(q.insert(i, i * 10), OpResult::Success);
        }
        assert_eq!(q.insert(8, 80), OpResult::Full);

        let mut out = Kv::default();
        for i in 0..8u64 {
            assert_eq!(q.pop(&mut out), OpResult::Success);
            assert_eq!(out, Kv::new(i, i * 10));
        }
        assert_eq!(q.pop(&mut out), OpResult::NotFound);
        assert_eq!(q.verify(), OpResult::Success);
    }

    #[test]
    fn eight_producers_one_full_slot_each() {
        let arena = Arena::new(4 * 1024 * 1024).unwrap();
        let q = VyukovMpmc::init(&arena, 8).unwrap();

        thread::scope(|scope| {
            for i in 0..8u64 {
                let q = &q;
                scope.spawn(move || {
                    assert_eq!(q.insert(i, i), OpResult::Success);
                });
            }
        });
        assert_eq!(q.count(), 8);
        assert_eq!(q.insert(99, 99), OpResult::Full);

        let mut total = 0;
        let mut out = Kv::default();
        while q.pop(&mut out) == OpResult::Success {
            total += 1;
        }
        assert_eq!(total, 8);
        assert_eq!(q.verify(), OpResult::Success);
    }
}

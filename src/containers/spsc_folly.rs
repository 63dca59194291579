//! Folly-style SPSC bounded ring (spec.md §4.H).
//!
//! Exactly one producer, one consumer. `size` always reserves one slot so
//! `read_idx == write_idx` unambiguously means empty; the ring can never
//! hold more than `size - 1` elements. Indices are cache-line padded
//! ([`PaddedSequence`]) to keep the producer's writes to `write_idx` from
//! invalidating the consumer's cache line holding `read_idx`, and vice
//! versa.

use std::sync::atomic::Ordering;

use crate::arena::{Arena, ArenaOffset};
use crate::atomics;
use crate::containers::common::PaddedSequence;
use crate::result::OpResult;
use crate::types::{ContainerHandle, ContainerMetadata, Kv};

#[repr(C)]
pub struct FollySpscHead {
    records: ArenaOffset,
    size: u32,
    read_idx: PaddedSequence,
    write_idx: PaddedSequence,
}

const METADATA: ContainerMetadata = ContainerMetadata {
    name: "folly_spsc_ring",
    description: "Single-producer/single-consumer ring with one reserved empty-marker slot",
    node_size: std::mem::size_of::<Kv>(),
    requires_locking: false,
};

pub struct FollySpsc<'a> {
    arena: &'a Arena,
    head: ArenaOffset,
}

impl<'a> FollySpsc<'a> {
    /// `size` must be at least 2 (one slot is always kept empty).
    pub fn init(arena: &'a Arena, size: u32) -> Option<Self> {
        if size < 2 {
            return None;
        }
        let records_off = arena.alloc(size as usize * std::mem::size_of::<Kv>())?;
        unsafe {
            let base = arena.resolve_mut::<Kv>(records_off);
            for i in 0..size as usize {
                std::ptr::write(base.add(i), Kv::default());
            }
        }
        let head_off = arena.alloc_for::<FollySpscHead>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<FollySpscHead>(head_off),
                FollySpscHead {
                    records: records_off,
                    size,
                    read_idx: PaddedSequence::new(0),
                    write_idx: PaddedSequence::new(0),
                },
            );
        }
        Some(Self {
            arena,
            head: head_off,
        })
    }

    fn head(&self) -> &FollySpscHead {
        unsafe { &*self.arena.resolve::<FollySpscHead>(self.head) }
    }

    unsafe fn slot(&self, index: u32) -> *mut Kv {
        let h = self.head();
        self.arena.resolve_mut::<Kv>(h.records).add(index as usize)
    }

    /// Sole producer.
    pub fn insert(&self, key: u64, value: u64) -> OpResult {
        let h = self.head();
        let cur = atomics::relaxed_read(&h.write_idx.value) as u32;
        let next = (cur + 1) % h.size;

        let read = atomics::acquire_load(&h.read_idx.value) as u32;
        if next == read {
            return OpResult::Full;
        }

        unsafe {
            std::ptr::write_volatile(self.slot(cur), Kv::new(key, value));
        }
        atomics::release_store(&h.write_idx.value, next as u64);
        OpResult::Success
    }

    /// Sole consumer.
    pub fn pop(&self, out: &mut Kv) -> OpResult {
        let h = self.head();
        let cur = atomics::relaxed_read(&h.read_idx.value) as u32;
        let write = atomics::acquire_load(&h.write_idx.value) as u32;
        if cur == write {
            return OpResult::NotFound;
        }

        *out = unsafe { std::ptr::read_volatile(self.slot(cur)) };
        let next = (cur + 1) % h.size;
        atomics::release_store(&h.read_idx.value, next as u64);
        OpResult::Success
    }

    /// Linear scan over the currently-occupied range. Safe to call from
    /// either party since it never advances an index.
    pub fn search(&self, key: u64) -> OpResult {
        let h = self.head();
        let read = atomics::acquire_load(&h.read_idx.value) as u32;
        let write = atomics::acquire_load(&h.write_idx.value) as u32;
        let mut i = read;
        while i != write {
            let kv = unsafe { std::ptr::read_volatile(self.slot(i)) };
            if kv.key == key {
                return OpResult::Success;
            }
            i = (i + 1) % h.size;
        }
        OpResult::NotFound
    }

    pub fn verify(&self) -> OpResult {
        let h = self.head();
        let read = atomics::acquire_load(&h.read_idx.value) as u32;
        let write = atomics::acquire_load(&h.write_idx.value) as u32;
        if read >= h.size || write >= h.size {
            tracing::error!(read, write, size = h.size, "folly_spsc verify: index out of range");
            return OpResult::Corrupt;
        }
        OpResult::Success
    }
}

impl<'a> ContainerHandle for FollySpsc<'a> {
    fn metadata(&self) -> &'static ContainerMetadata {
        &METADATA
    }

    fn count(&self) -> u64 {
        let h = self.head();
        let read = atomics::acquire_load(&h.read_idx.value) as u32;
        let write = atomics::acquire_load(&h.write_idx.value) as u32;
        ((write + h.size - read) % h.size) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_ring() {
        let arena = Arena::new(4096).unwrap();
        assert!(FollySpsc::init(&arena, 1).is_none());
    }

    #[test]
    fn spsc_basic_fifo() {
        let arena = Arena::new(4096).unwrap();
        let ring = FollySpsc::init(&arena, 4).unwrap();
        assert_eq!(ring.insert(1, 100), OpResult::Success);
        assert_eq!(ring.insert(2, 200), OpResult::Success);
        assert_eq!(ring.insert(3, 300), OpResult::Success);

        let mut out = Kv::default();
        assert_eq!(ring.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(1, 100));
        assert_eq!(ring.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(2, 200));
        assert_eq!(ring.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(3, 300));
        assert_eq!(ring.pop(&mut out), OpResult::NotFound);
    }

    #[test]
    fn full_then_succeeds_after_pop() {
        let arena = Arena::new(4096).unwrap();
        let ring = FollySpsc::init(&arena, 4).unwrap();
        assert_eq!(ring.insert(1, 1), OpResult::Success);
        assert_eq!(ring.insert(2, 2), OpResult::Success);
        assert_eq!(ring.insert(3, 3), OpResult::Success);
        assert_eq!(ring.insert(4, 4), OpResult::Full);

        let mut out = Kv::default();
        assert_eq!(ring.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(1, 1));
        assert_eq!(ring.insert(4, 4), OpResult::Success);
        assert_eq!(ring.verify(), OpResult::Success);
    }
}

//! The bounded, append-only shared-memory arena (spec.md §4.B).
//!
//! An `Arena` is a single contiguous region from which every container's
//! head record and nodes are bump-allocated. Addresses inside the arena are
//! never stored as raw pointers in arena-resident structs — only as
//! [`ArenaOffset`]s, byte offsets from the arena's base, materialized on
//! demand via [`Arena::resolve`]/[`Arena::resolve_mut`]. This is the
//! `ArenaRef` newtype the Design Notes call for: it is what lets the same
//! struct definitions work whether the arena is a private heap allocation
//! or a `mmap`'d region that a producer and a consumer map at different
//! base addresses.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::atomics;
use crate::error::{FluxCellError, Result};

/// Minimum arena size accepted by [`Arena::new`]: 1000 pages of 4 KiB,
/// per spec.md §3's baseline.
pub const MIN_ARENA_CAPACITY: usize = 1000 * 4096;

/// Round `n` up to the next multiple of 8.
#[inline(always)]
fn round_up8(n: usize) -> usize {
    (n + 7) & !7
}

/// Upper bound on bump-allocator CAS contention before giving up. Matches
/// the shape of the teacher's `MpscClaim::try_claim` retry loop, but an
/// append-only bump allocator is expected to converge in a handful of
/// iterations even under heavy concurrent `alloc` traffic.
const MAX_ALLOC_RETRIES: u32 = 256;

/// A byte offset from an [`Arena`]'s base, standing in for a raw pointer
/// into arena-resident memory. `NULL` is the reserved sentinel offset and
/// is never returned by [`Arena::alloc`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaOffset(pub u64);

impl ArenaOffset {
    pub const NULL: ArenaOffset = ArenaOffset(u64::MAX);

    #[inline(always)]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl Default for ArenaOffset {
    fn default() -> Self {
        Self::NULL
    }
}

/// An `AtomicU64`-backed atomic [`ArenaOffset`], the "link" type every
/// container uses for `next`/`head`/`tail` fields. `NULL` is `u64::MAX`,
/// never a valid bump-allocated offset within [`MIN_ARENA_CAPACITY`]-sized
/// arenas.
#[repr(transparent)]
pub struct AtomicOffset(AtomicU64);

impl AtomicOffset {
    pub fn new(initial: ArenaOffset) -> Self {
        Self(AtomicU64::new(initial.0))
    }

    #[inline(always)]
    pub fn load(&self, order: Ordering) -> ArenaOffset {
        ArenaOffset(self.0.load(order))
    }

    #[inline(always)]
    pub fn store(&self, value: ArenaOffset, order: Ordering) {
        self.0.store(value.0, order)
    }

    #[inline(always)]
    pub fn compare_exchange(
        &self,
        current: ArenaOffset,
        new: ArenaOffset,
        success: Ordering,
        failure: Ordering,
    ) -> (ArenaOffset, bool) {
        let (prior, swapped) = atomics::cas(&self.0, current.0, new.0, success, failure);
        (ArenaOffset(prior), swapped)
    }

    #[inline(always)]
    pub fn exchange(&self, new: ArenaOffset, order: Ordering) -> ArenaOffset {
        ArenaOffset(self.0.swap(new.0, order))
    }
}

impl atomics::AtomicWord for AtomicOffset {
    type Value = ArenaOffset;

    #[inline(always)]
    fn load(&self, order: Ordering) -> ArenaOffset {
        AtomicOffset::load(self, order)
    }

    #[inline(always)]
    fn store(&self, value: ArenaOffset, order: Ordering) {
        AtomicOffset::store(self, value, order)
    }

    #[inline(always)]
    fn compare_exchange(
        &self,
        current: ArenaOffset,
        new: ArenaOffset,
        success: Ordering,
        failure: Ordering,
    ) -> std::result::Result<ArenaOffset, ArenaOffset> {
        let (prior, swapped) = AtomicOffset::compare_exchange(self, current, new, success, failure);
        if swapped {
            Ok(prior)
        } else {
            Err(prior)
        }
    }

    #[inline(always)]
    fn fetch_add(&self, value: ArenaOffset, order: Ordering) -> ArenaOffset {
        ArenaOffset(self.0.fetch_add(value.0, order))
    }

    #[inline(always)]
    fn fetch_sub(&self, value: ArenaOffset, order: Ordering) -> ArenaOffset {
        ArenaOffset(self.0.fetch_sub(value.0, order))
    }

    #[inline(always)]
    fn fetch_and(&self, value: ArenaOffset, order: Ordering) -> ArenaOffset {
        ArenaOffset(self.0.fetch_and(value.0, order))
    }

    #[inline(always)]
    fn fetch_or(&self, value: ArenaOffset, order: Ordering) -> ArenaOffset {
        ArenaOffset(self.0.fetch_or(value.0, order))
    }
}

enum Backing {
    Heap(Box<[u8]>),
    Mapped(memmap2::MmapMut),
}

/// A bounded, append-only, bump-allocated shared-memory region.
///
/// `alloc` is concurrent-safe; addresses handed out never change meaning
/// for the lifetime of the arena (there is no reclamation), which is what
/// gives every CAS-based container in this crate its ABA safety without
/// hazard pointers.
pub struct Arena {
    backing: Backing,
    base: *mut u8,
    capacity: usize,
    next: AtomicUsize,
}

// The arena's raw `base` pointer is only ever used to materialize offsets
// that are themselves guarded by the containers' own synchronization
// (acquire-loads before dereference); the arena itself does not mutate
// through `base` without going through `alloc`'s atomic cursor.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Create a heap-backed arena of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 8 {
            return Err(FluxCellError::capacity("arena capacity must be at least 8 bytes"));
        }
        let mut storage = vec![0u8; capacity].into_boxed_slice();
        let base = storage.as_mut_ptr();
        tracing::debug!(capacity, backing = "heap", "arena created");
        Ok(Self {
            backing: Backing::Heap(storage),
            base,
            capacity,
            next: AtomicUsize::new(0),
        })
    }

    /// Create an anonymous memory-mapped arena of `capacity` bytes, locked
    /// against swapping. Mirrors the teacher's `RingBuffer::new_mapped`.
    pub fn new_mapped(capacity: usize) -> Result<Self> {
        if capacity < 8 {
            return Err(FluxCellError::capacity("arena capacity must be at least 8 bytes"));
        }
        let mut mmap = memmap2::MmapOptions::new().len(capacity).map_anon()?;
        mmap.fill(0);
        #[cfg(unix)]
        {
            if mmap.lock().is_err() {
                tracing::warn!(capacity, "mlock failed; arena pages may be swapped");
            }
        }
        let base = mmap.as_mut_ptr();
        tracing::debug!(capacity, backing = "mmap", "arena created");
        Ok(Self {
            backing: Backing::Mapped(mmap),
            base,
            capacity,
            next: AtomicUsize::new(0),
        })
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out so far (monotonic high-water mark, not reclaimed).
    #[inline(always)]
    pub fn used(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.capacity)
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Bump-allocate `nbytes`, rounded up to 8-byte alignment. Returns
    /// `None` on overflow — callers map this to `OpResult::NoMem`.
    pub fn alloc(&self, nbytes: usize) -> Option<ArenaOffset> {
        let size = round_up8(nbytes);
        let mut retries = 0u32;
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let end = current.checked_add(size)?;
            if end > self.capacity {
                tracing::warn!(requested = nbytes, capacity = self.capacity, "arena exhausted");
                return None;
            }
            match self.next.compare_exchange_weak(
                current,
                end,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(ArenaOffset(current as u64)),
                Err(_) => {
                    retries += 1;
                    if retries >= MAX_ALLOC_RETRIES {
                        return None;
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Allocate room for one `T`, 8-byte aligned. Does not initialize it;
    /// callers must `ptr::write` through [`Arena::resolve_mut`] before any
    /// other thread can observe the offset.
    pub fn alloc_for<T>(&self) -> Option<ArenaOffset> {
        self.alloc(std::mem::size_of::<T>())
    }

    /// `free` is a documented no-op: this allocator never reclaims, which
    /// is the source of the ABA safety every CAS algorithm here relies on.
    #[inline(always)]
    pub fn free(&self, _offset: ArenaOffset) {}

    /// Materialize an `ArenaOffset` as a shared pointer.
    ///
    /// # Safety
    /// `offset` must have been returned by `alloc`/`alloc_for` on this same
    /// arena and must not be [`ArenaOffset::NULL`].
    #[inline(always)]
    pub unsafe fn resolve<T>(&self, offset: ArenaOffset) -> *const T {
        debug_assert!(!offset.is_null());
        debug_assert!((offset.0 as usize) < self.capacity);
        self.base.add(offset.0 as usize) as *const T
    }

    /// Materialize an `ArenaOffset` as a mutable pointer.
    ///
    /// # Safety
    /// Same preconditions as [`Arena::resolve`], plus the caller must have
    /// exclusive access to the pointee for the duration of the write.
    #[inline(always)]
    pub unsafe fn resolve_mut<T>(&self, offset: ArenaOffset) -> *mut T {
        debug_assert!(!offset.is_null());
        debug_assert!((offset.0 as usize) < self.capacity);
        self.base.add(offset.0 as usize) as *mut T
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tiny_capacity() {
        assert!(Arena::new(4).is_err());
    }

    #[test]
    fn alloc_advances_and_reports_usage() {
        let arena = Arena::new(4096).unwrap();
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(10).unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.used(), 32); // 16 + 16 rounded up to 8-byte multiples
    }

    #[test]
    fn alloc_returns_none_on_overflow() {
        let arena = Arena::new(16).unwrap();
        assert!(arena.alloc(8).is_some());
        assert!(arena.alloc(16).is_none());
    }

    #[test]
    fn resolve_round_trips_a_write() {
        let arena = Arena::new(4096).unwrap();
        let off = arena.alloc_for::<u64>().unwrap();
        unsafe {
            *arena.resolve_mut::<u64>(off) = 0xdead_beef;
            assert_eq!(*arena.resolve::<u64>(off), 0xdead_beef);
        }
    }

    #[test]
    fn mapped_arena_allocates_too() {
        let arena = Arena::new_mapped(8192).unwrap();
        let off = arena.alloc_for::<u64>().unwrap();
        unsafe {
            *arena.resolve_mut::<u64>(off) = 7;
            assert_eq!(*arena.resolve::<u64>(off), 7);
        }
    }

    #[test]
    fn atomic_offset_cas() {
        let link = AtomicOffset::new(ArenaOffset::NULL);
        let target = ArenaOffset(8);
        let (prior, swapped) =
            link.compare_exchange(ArenaOffset::NULL, target, Ordering::AcqRel, Ordering::Acquire);
        assert!(swapped);
        assert_eq!(prior, ArenaOffset::NULL);
        assert_eq!(link.load(Ordering::Acquire), target);
    }
}

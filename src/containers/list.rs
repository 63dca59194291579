//! Doubly-linked ordered list (spec.md §4.D).
//!
//! Single-writer / externally-serialized: insertion and deletion are not
//! safe under concurrent writers (spec.md §9, Open Question 1 — the
//! specification assumes external serialization and this crate follows
//! that assumption rather than guessing a CAS-based redesign). `search`
//! and `verify` may run concurrently with a single writer using
//! acquire-loads on every link they dereference.
//!
//! `pprev` exploits the same trick the Linux kernel's `hlist` uses: every
//! node's `next` field, and the head's `first` field, sit at byte offset 0
//! of their struct. So "the address of a predecessor's `next` field" is
//! simply that predecessor's own [`ArenaOffset`] — whether the predecessor
//! is a real node or the head record itself. `pprev` therefore always
//! holds a node or head offset, never a "pointer to a field" distinct from
//! a node address.

use std::sync::atomic::Ordering;

use crate::arena::{Arena, ArenaOffset, AtomicOffset};
use crate::atomics;
use crate::result::OpResult;
use crate::types::{ContainerHandle, ContainerMetadata, Kv};

#[repr(C)]
struct ListNode {
    next: AtomicOffset,
    pprev: AtomicOffset,
    kv: Kv,
}

#[repr(C)]
pub struct ListHead {
    first: AtomicOffset,
    count: std::sync::atomic::AtomicU64,
}

const METADATA: ContainerMetadata = ContainerMetadata {
    name: "doubly_linked_list",
    description: "Ordered-sequence container, externally serialized against concurrent writers",
    node_size: std::mem::size_of::<ListNode>(),
    requires_locking: true,
};

/// A handle to a [`ListHead`] installed in an [`Arena`].
pub struct List<'a> {
    arena: &'a Arena,
    head: ArenaOffset,
}

impl<'a> List<'a> {
    /// Install a fresh list head in `arena`.
    pub fn init(arena: &'a Arena) -> Option<Self> {
        let head_off = arena.alloc_for::<ListHead>()?;
        unsafe {
            let head_ptr = arena.resolve_mut::<ListHead>(head_off);
            std::ptr::write(
                head_ptr,
                ListHead {
                    first: AtomicOffset::new(ArenaOffset::NULL),
                    count: std::sync::atomic::AtomicU64::new(0),
                },
            );
        }
        Some(Self {
            arena,
            head: head_off,
        })
    }

    fn head(&self) -> &ListHead {
        unsafe { &*self.arena.resolve::<ListHead>(self.head) }
    }

    /// The link field at `offset`: either a `ListHead.first` or a
    /// `ListNode.next`, both at byte offset 0 of their struct.
    unsafe fn link_at(&self, offset: ArenaOffset) -> &AtomicOffset {
        &*self.arena.resolve::<AtomicOffset>(offset)
    }

    unsafe fn node_at(&self, offset: ArenaOffset) -> &ListNode {
        &*self.arena.resolve::<ListNode>(offset)
    }

    /// Append `(key, value)` at the tail. O(n) walk, as specified.
    pub fn insert(&self, key: u64, value: u64) -> OpResult {
        let new_off = match self.arena.alloc_for::<ListNode>() {
            Some(off) => off,
            None => return OpResult::NoMem,
        };

        // Walk to the tail, tracking the offset of the last node (or the
        // head itself, if the list is empty).
        let mut prev = self.head;
        let mut cur = atomics::acquire_load(&self.head().first);
        while !cur.is_null() {
            prev = cur;
            cur = unsafe { atomics::acquire_load(&self.node_at(cur).next) };
        }

        unsafe {
            let node_ptr = self.arena.resolve_mut::<ListNode>(new_off);
            std::ptr::write(
                node_ptr,
                ListNode {
                    next: AtomicOffset::new(ArenaOffset::NULL),
                    pprev: AtomicOffset::new(prev),
                    kv: Kv::new(key, value),
                },
            );
            atomics::release_store(self.link_at(prev), new_off);
        }

        self.head().count.fetch_add(1, Ordering::Relaxed);
        OpResult::Success
    }

    /// Search for `key`.
    pub fn search(&self, key: u64) -> OpResult {
        let mut cur = atomics::acquire_load(&self.head().first);
        while !cur.is_null() {
            let node = unsafe { self.node_at(cur) };
            if node.kv.key == key {
                return OpResult::Success;
            }
            cur = atomics::acquire_load(&node.next);
        }
        OpResult::NotFound
    }

    /// Remove and return the first element.
    pub fn pop(&self, out: &mut Kv) -> OpResult {
        let first = atomics::acquire_load(&self.head().first);
        if first.is_null() {
            return OpResult::NotFound;
        }
        let node = unsafe { self.node_at(first) };
        *out = node.kv;
        let next = atomics::acquire_load(&node.next);
        atomics::release_store(&self.head().first, next);
        if !next.is_null() {
            let next_node = unsafe { self.node_at(next) };
            atomics::relaxed_write(&next_node.pprev, self.head);
        }
        self.head().count.fetch_sub(1, Ordering::Relaxed);
        self.arena.free(first);
        OpResult::Success
    }

    /// Remove the first element matching `key`.
    pub fn delete(&self, key: u64) -> OpResult {
        let mut prev = self.head;
        let mut cur = atomics::acquire_load(&self.head().first);
        while !cur.is_null() {
            let node = unsafe { self.node_at(cur) };
            if node.kv.key == key {
                let next = atomics::acquire_load(&node.next);
                unsafe {
                    atomics::release_store(self.link_at(prev), next);
                }
                if !next.is_null() {
                    let next_node = unsafe { self.node_at(next) };
                    atomics::relaxed_write(&next_node.pprev, prev);
                }
                self.head().count.fetch_sub(1, Ordering::Relaxed);
                self.arena.free(cur);
                return OpResult::Success;
            }
            prev = cur;
            cur = atomics::acquire_load(&node.next);
        }
        OpResult::NotFound
    }

    /// Walk the list checking that every node's `pprev` matches its
    /// predecessor's offset and that `count` matches the reachable length.
    pub fn verify(&self) -> OpResult {
        let mut prev = self.head;
        let mut cur = atomics::acquire_load(&self.head().first);
        let mut n = 0u64;
        while !cur.is_null() {
            let node = unsafe { self.node_at(cur) };
            if atomics::relaxed_read(&node.pprev) != prev {
                tracing::error!("list verify: pprev mismatch at node offset {:?}", cur);
                return OpResult::Corrupt;
            }
            prev = cur;
            cur = atomics::acquire_load(&node.next);
            n += 1;
        }
        if n != self.head().count.load(Ordering::Relaxed) {
            tracing::error!(walked = n, "list verify: count mismatch");
            return OpResult::Corrupt;
        }
        OpResult::Success
    }
}

impl<'a> ContainerHandle for List<'a> {
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

    #[test]
    fn insert_preserves_order_and_pops_fifo() {
        let arena = Arena::new(64 * 1024).unwrap();
        let list = List::init(&arena).unwrap();

        assert_eq!(list.insert(1, 10), OpResult::Success);
        assert_eq!(list.insert(2, 20), OpResult::Success);
        assert_eq!(list.insert(3, 30), OpResult::Success);
        assert_eq!(list.count(), 3);

        let mut out = Kv::default();
        assert_eq!(list.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(1, 10));
        assert_eq!(list.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(2, 20));
        assert_eq!(list.pop(&mut out), OpResult::Success);
        assert_eq!(out, Kv::new(3, 30));
        assert_eq!(list.pop(&mut out), OpResult::NotFound);
    }

    #[test]
    fn search_and_delete() {
        let arena = Arena::new(64 * 1024).unwrap();
        let list = List::init(&arena).unwrap();
        list.insert(1, 10);
        list.insert(2, 20);
        list.insert(3, 30);

        assert_eq!(list.search(2), OpResult::Success);
        assert_eq!(list.delete(2), OpResult::Success);
        assert_eq!(list.search(2), OpResult::NotFound);
        assert_eq!(list.delete(2), OpResult::NotFound);
        assert_eq!(list.count(), 2);
        assert_eq!(list.verify(), OpResult::Success);
    }

    #[test]
    fn verify_after_full_drain() {
        let arena = Arena::new(64 * 1024).unwrap();
        let list = List::init(&arena).unwrap();
        for i in 0..10 {
            list.insert(i, i * 10);
        }
        let mut out = Kv::default();
        while list.pop(&mut out) == OpResult::Success {}
        assert_eq!(list.verify(), OpResult::Success);
        assert_eq!(list.count(), 0);
    }
}

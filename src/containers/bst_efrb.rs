//! Ellen-Fatourou-Ruppert-van Breugel non-blocking leaf-oriented BST
//! (spec.md §4.J).
//!
//! Data lives only in leaves; internal nodes are pure routing. A pending
//! structural change (an insert splicing in a new subtree, a delete
//! unsplicing one) is announced by CASing a flag into the affected node's
//! `update` word before touching any child pointer, so any other thread
//! that stumbles onto a flagged node can finish the operation itself
//! (`help`) instead of blocking. The `update` word packs a descriptor
//! offset in its high bits and a 2-bit state in its low bits — safe
//! because every arena allocation is 8-byte aligned, leaving 3 low bits
//! free and we only need 2.
//!
//! Bookkeeping (`count`) is incremented/decremented exactly once, by
//! whichever thread's CAS wins the node's flag — not by whichever thread
//! happens to perform the follow-up structural CAS, since that may be a
//! helper acting for a different, unrelated operation instance.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::arena::{Arena, ArenaOffset, AtomicOffset};
use crate::atomics;
use crate::constants::{MAX_BST_RETRIES, MAX_TRAVERSAL_DEPTH, SENTINEL1, SENTINEL2};
use crate::result::OpResult;
use crate::types::{ContainerHandle, ContainerMetadata, Kv};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Leaf = 0,
    Internal = 1,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateState {
    Clean = 0,
    DFlag = 1,
    IFlag = 2,
    Mark = 3,
}

#[repr(C)]
struct LeafNode {
    kind: NodeKind,
    kv: Kv,
}

#[repr(C)]
struct InternalNode {
    kind: NodeKind,
    key: u64,
    left: AtomicOffset,
    right: AtomicOffset,
    update: AtomicU64,
}

#[repr(C)]
struct InsertInfo {
    p_parent: ArenaOffset,
    p_new: ArenaOffset,
    p_leaf: ArenaOffset,
    b_right_leaf: bool,
}

#[repr(C)]
struct DeleteInfo {
    gp: ArenaOffset,
    p: ArenaOffset,
    l: ArenaOffset,
    p_update: u64,
}

#[repr(C)]
pub struct BstHead {
    root: ArenaOffset,
    count: AtomicU64,
}

const METADATA: ContainerMetadata = ContainerMetadata {
    name: "efrb_bst",
    description: "Leaf-oriented non-blocking BST with tagged update descriptors",
    node_size: std::mem::size_of::<InternalNode>(),
    requires_locking: false,
};

/// Pack a descriptor offset and state into one word. `None` encodes as 0
/// in the high bits (shifted offsets are `off + 1` so a real offset of 0
/// is never mistaken for "no descriptor").
fn make_update(descriptor: Option<ArenaOffset>, state: UpdateState) -> u64 {
    let encoded = match descriptor {
        Some(off) => (off.0 + 1) << 2,
        None => 0,
    };
    encoded | state as u64
}

fn get_ptr(update: u64) -> Option<ArenaOffset> {
    let encoded = update >> 2;
    if encoded == 0 {
        None
    } else {
        Some(ArenaOffset(encoded - 1))
    }
}

fn get_state(update: u64) -> UpdateState {
    match update & 0b11 {
        0 => UpdateState::Clean,
        1 => UpdateState::DFlag,
        2 => UpdateState::IFlag,
        _ => UpdateState::Mark,
    }
}

struct SearchCtx {
    gp: Option<ArenaOffset>,
    p: ArenaOffset,
    l: ArenaOffset,
    upd_gp: u64,
    upd_p: u64,
}

pub struct BstEfrb<'a> {
    arena: &'a Arena,
    head: ArenaOffset,
}

impl<'a> BstEfrb<'a> {
    pub fn init(arena: &'a Arena) -> Option<Self> {
        let s1_off = arena.alloc_for::<LeafNode>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<LeafNode>(s1_off),
                LeafNode {
                    kind: NodeKind::Leaf,
                    kv: Kv::new(SENTINEL1, 0),
                },
            );
        }
        let s2_off = arena.alloc_for::<LeafNode>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<LeafNode>(s2_off),
                LeafNode {
                    kind: NodeKind::Leaf,
                    kv: Kv::new(SENTINEL2, 0),
                },
            );
        }
        let root_off = arena.alloc_for::<InternalNode>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<InternalNode>(root_off),
                InternalNode {
                    kind: NodeKind::Internal,
                    key: SENTINEL2,
                    left: AtomicOffset::new(s1_off),
                    right: AtomicOffset::new(s2_off),
                    update: AtomicU64::new(make_update(None, UpdateState::Clean)),
                },
            );
        }
        let head_off = arena.alloc_for::<BstHead>()?;
        unsafe {
            std::ptr::write(
                arena.resolve_mut::<BstHead>(head_off),
                BstHead {
                    root: root_off,
                    count: AtomicU64::new(0),
                },
            );
        }
        Some(Self {
            arena,
            head: head_off,
        })
    }

    fn head(&self) -> &BstHead {
        unsafe { &*self.arena.resolve::<BstHead>(self.head) }
    }

    unsafe fn internal_at(&self, off: ArenaOffset) -> &InternalNode {
        &*self.arena.resolve::<InternalNode>(off)
    }

    unsafe fn leaf_at(&self, off: ArenaOffset) -> &LeafNode {
        &*self.arena.resolve::<LeafNode>(off)
    }

    unsafe fn node_kind(&self, off: ArenaOffset) -> NodeKind {
        match *self.arena.resolve::<u8>(off) {
            0 => NodeKind::Leaf,
            _ => NodeKind::Internal,
        }
    }

    unsafe fn leaf_value_ptr(&self, off: ArenaOffset) -> *const AtomicU64 {
        let leaf = self.arena.resolve::<LeafNode>(off);
        std::ptr::addr_of!((*leaf).kv.value) as *const AtomicU64
    }

    fn child_offset(node: &InternalNode, key: u64) -> ArenaOffset {
        if key < node.key {
            node.left.load(Ordering::Acquire)
        } else {
            node.right.load(Ordering::Acquire)
        }
    }

    /// Iterative descent from the root. Backing off mid-traversal on a
    /// flagged ancestor isn't necessary for correctness here: `insert`
    /// and `delete` both re-check the final parent's (and grandparent's)
    /// update word after locating the leaf and help + retry if it is not
    /// `Clean`, which gives the same "help, then retry" behavior the
    /// specification describes.
    fn locate(&self, key: u64) -> Option<SearchCtx> {
        let root = self.head().root;
        let mut gp: Option<ArenaOffset> = None;
        let mut upd_gp = make_update(None, UpdateState::Clean);
        let mut p = root;
        let mut upd_p = unsafe { self.internal_at(p).update.load(Ordering::Acquire) };
        let mut l = unsafe { Self::child_offset(self.internal_at(p), key) };

        let mut depth = 0usize;
        while unsafe { self.node_kind(l) } == NodeKind::Internal {
            depth += 1;
            if depth > MAX_TRAVERSAL_DEPTH {
                return None;
            }
            gp = Some(p);
            upd_gp = upd_p;
            p = l;
            upd_p = unsafe { self.internal_at(p).update.load(Ordering::Acquire) };
            l = unsafe { Self::child_offset(self.internal_at(p), key) };
        }

        Some(SearchCtx {
            gp,
            p,
            l,
            upd_gp,
            upd_p,
        })
    }

    fn help(&self, update: u64) {
        let Some(info_off) = get_ptr(update) else {
            return;
        };
        match get_state(update) {
            UpdateState::Clean => {}
            UpdateState::IFlag => self.help_insert(info_off, update),
            UpdateState::Mark => self.help_marked(info_off),
            UpdateState::DFlag => {
                self.help_delete(info_off);
            }
        }
    }

    fn help_insert(&self, info_off: ArenaOffset, update_word: u64) {
        let info = unsafe { &*self.arena.resolve::<InsertInfo>(info_off) };
        let p = unsafe { self.internal_at(info.p_parent) };
        let child = if info.b_right_leaf { &p.right } else { &p.left };
        child.compare_exchange(info.p_leaf, info.p_new, Ordering::Release, Ordering::Acquire);
        let clean = make_update(None, UpdateState::Clean);
        atomics::cas(&p.update, update_word, clean, Ordering::Release, Ordering::Relaxed);
    }

    /// Returns `true` once this descriptor's deletion is guaranteed to
    /// complete (by us or a helper); `false` if we backed off because a
    /// concurrent operation owned `p` first, meaning the caller must
    /// retry from a fresh search.
    fn help_delete(&self, info_off: ArenaOffset) -> bool {
        let info = unsafe { &*self.arena.resolve::<DeleteInfo>(info_off) };
        let p = unsafe { self.internal_at(info.p) };
        let mark_word = make_update(Some(info_off), UpdateState::Mark);
        let (prior, swapped) = atomics::cas(
            &p.update,
            info.p_update,
            mark_word,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let already_ours_and_marked =
            get_ptr(prior) == Some(info_off) && get_state(prior) == UpdateState::Mark;
        if swapped || already_ours_and_marked {
            self.help_marked(info_off);
            true
        } else {
            self.help(prior);
            let gp = unsafe { self.internal_at(info.gp) };
            let dflag_word = make_update(Some(info_off), UpdateState::DFlag);
            let clean = make_update(None, UpdateState::Clean);
            atomics::cas(&gp.update, dflag_word, clean, Ordering::Release, Ordering::Relaxed);
            false
        }
    }

    fn help_marked(&self, info_off: ArenaOffset) {
        let info = unsafe { &*self.arena.resolve::<DeleteInfo>(info_off) };
        let p = unsafe { self.internal_at(info.p) };
        let p_left = p.left.load(Ordering::Acquire);
        let sibling = if p_left == info.l {
            p.right.load(Ordering::Acquire)
        } else {
            p_left
        };

        let gp = unsafe { self.internal_at(info.gp) };
        let gp_left = gp.left.load(Ordering::Acquire);
        let child = if gp_left == info.p { &gp.left } else { &gp.right };
        child.compare_exchange(info.p, sibling, Ordering::Release, Ordering::Acquire);

        let dflag_word = make_update(Some(info_off), UpdateState::DFlag);
        let clean = make_update(None, UpdateState::Clean);
        atomics::cas(&gp.update, dflag_word, clean, Ordering::Release, Ordering::Relaxed);
    }

    fn build_insert_nodes(&self, key: u64, value: u64, existing_off: ArenaOffset, existing_key: u64) -> Option<(ArenaOffset, ArenaOffset)> {
        let new_leaf_off = self.arena.alloc_for::<LeafNode>()?;
        unsafe {
            std::ptr::write(
                self.arena.resolve_mut::<LeafNode>(new_leaf_off),
                LeafNode {
                    kind: NodeKind::Leaf,
                    kv: Kv::new(key, value),
                },
            );
        }
        let (left, right, routing_key) = if key < existing_key {
            (new_leaf_off, existing_off, existing_key)
        } else {
            (existing_off, new_leaf_off, key)
        };
        let new_internal_off = self.arena.alloc_for::<InternalNode>()?;
        unsafe {
            std::ptr::write(
                self.arena.resolve_mut::<InternalNode>(new_internal_off),
                InternalNode {
                    kind: NodeKind::Internal,
                    key: routing_key,
                    left: AtomicOffset::new(left),
                    right: AtomicOffset::new(right),
                    update: AtomicU64::new(make_update(None, UpdateState::Clean)),
                },
            );
        }
        Some((new_leaf_off, new_internal_off))
    }

    /// Insert-or-update: an existing key has its value overwritten
    /// in place rather than rejected.
    pub fn insert(&self, key: u64, value: u64) -> OpResult {
        if key >= SENTINEL1 {
            return OpResult::Invalid;
        }
        for _ in 0..MAX_BST_RETRIES {
            let ctx = match self.locate(key) {
                Some(c) => c,
                None => return OpResult::Busy,
            };
            let leaf = unsafe { self.leaf_at(ctx.l) };
            if leaf.kv.key == key {
                unsafe {
                    atomics::release_store(&*self.leaf_value_ptr(ctx.l), value);
                }
                return OpResult::Success;
            }
            if get_state(ctx.upd_p) != UpdateState::Clean {
                self.help(ctx.upd_p);
                continue;
            }

            let p_node = unsafe { self.internal_at(ctx.p) };
            let b_right_leaf = p_node.right.load(Ordering::Acquire) == ctx.l;

            let (_, new_internal_off) =
                match self.build_insert_nodes(key, value, ctx.l, leaf.kv.key) {
                    Some(t) => t,
                    None => return OpResult::NoMem,
                };
            let info_off = match self.arena.alloc_for::<InsertInfo>() {
                Some(o) => o,
                None => return OpResult::NoMem,
            };
            unsafe {
                std::ptr::write(
                    self.arena.resolve_mut::<InsertInfo>(info_off),
                    InsertInfo {
                        p_parent: ctx.p,
                        p_new: new_internal_off,
                        p_leaf: ctx.l,
                        b_right_leaf,
                    },
                );
            }

            let iflag_word = make_update(Some(info_off), UpdateState::IFlag);
            let (prior, swapped) = atomics::cas(
                &p_node.update,
                ctx.upd_p,
                iflag_word,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if swapped {
                self.help_insert(info_off, iflag_word);
                self.head().count.fetch_add(1, Ordering::Relaxed);
                return OpResult::Success;
            }
            self.help(prior);
        }
        OpResult::Invalid
    }

    pub fn delete(&self, key: u64) -> OpResult {
        if key >= SENTINEL1 {
            return OpResult::Invalid;
        }
        for _ in 0..MAX_BST_RETRIES {
            let ctx = match self.locate(key) {
                Some(c) => c,
                None => return OpResult::Busy,
            };
            let leaf = unsafe { self.leaf_at(ctx.l) };
            if leaf.kv.key != key {
                return OpResult::NotFound;
            }
            let Some(gp_off) = ctx.gp else {
                return OpResult::Invalid;
            };

            if get_state(ctx.upd_gp) != UpdateState::Clean {
                self.help(ctx.upd_gp);
                continue;
            }
            if get_state(ctx.upd_p) != UpdateState::Clean {
                self.help(ctx.upd_p);
                continue;
            }

            let info_off = match self.arena.alloc_for::<DeleteInfo>() {
                Some(o) => o,
                None => return OpResult::NoMem,
            };
            unsafe {
                std::ptr::write(
                    self.arena.resolve_mut::<DeleteInfo>(info_off),
                    DeleteInfo {
                        gp: gp_off,
                        p: ctx.p,
                        l: ctx.l,
                        p_update: ctx.upd_p,
                    },
                );
            }

            let gp_node = unsafe { self.internal_at(gp_off) };
            let dflag_word = make_update(Some(info_off), UpdateState::DFlag);
            let (prior, swapped) = atomics::cas(
                &gp_node.update,
                ctx.upd_gp,
                dflag_word,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if swapped {
                if self.help_delete(info_off) {
                    self.head().count.fetch_sub(1, Ordering::Relaxed);
                    return OpResult::Success;
                }
                continue;
            }
            self.help(prior);
        }
        OpResult::Invalid
    }

    pub fn search(&self, key: u64) -> OpResult {
        if key >= SENTINEL1 {
            return OpResult::Invalid;
        }
        let ctx = match self.locate(key) {
            Some(c) => c,
            None => return OpResult::Busy,
        };
        let leaf = unsafe { self.leaf_at(ctx.l) };
        if leaf.kv.key == key {
            OpResult::Success
        } else {
            OpResult::NotFound
        }
    }

    pub fn verify(&self) -> OpResult {
        let root = self.head().root;
        let mut prev_key: Option<u64> = None;
        let mut leaf_count = 0u64;
        if self
            .verify_walk(root, 0, &mut prev_key, &mut leaf_count)
            .is_err()
        {
            tracing::error!("efrb_bst verify: BST property or structure violated");
            return OpResult::Corrupt;
        }
        if leaf_count != self.head().count.load(Ordering::Relaxed) {
            tracing::error!(leaf_count, "efrb_bst verify: leaf count mismatch");
            return OpResult::Corrupt;
        }
        OpResult::Success
    }

    fn verify_walk(
        &self,
        off: ArenaOffset,
        depth: usize,
        prev_key: &mut Option<u64>,
        leaf_count: &mut u64,
    ) -> Result<(), ()> {
        if depth > MAX_TRAVERSAL_DEPTH {
            return Err(());
        }
        match unsafe { self.node_kind(off) } {
            NodeKind::Leaf => {
                let leaf = unsafe { self.leaf_at(off) };
                if let Some(p) = *prev_key {
                    if leaf.kv.key <= p {
                        return Err(());
                    }
                }
                *prev_key = Some(leaf.kv.key);
                if leaf.kv.key < SENTINEL1 {
                    *leaf_count += 1;
                }
                Ok(())
            }
            NodeKind::Internal => {
                let node = unsafe { self.internal_at(off) };
                let left = node.left.load(Ordering::Acquire);
                let right = node.right.load(Ordering::Acquire);
                if left.is_null() || right.is_null() {
                    return Err(());
                }
                self.verify_walk(left, depth + 1, prev_key, leaf_count)?;
                self.verify_walk(right, depth + 1, prev_key, leaf_count)?;
                Ok(())
            }
        }
    }
}

impl<'a> ContainerHandle for BstEfrb<'a> {
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

    fn in_order(tree: &BstEfrb<'_>) -> Vec<u64> {
        let mut out = Vec::new();
        fn walk(tree: &BstEfrb<'_>, off: ArenaOffset, out: &mut Vec<u64>) {
            match unsafe { tree.node_kind(off) } {
                NodeKind::Leaf => {
                    let leaf = unsafe { tree.leaf_at(off) };
                    if leaf.kv.key < SENTINEL1 {
                        out.push(leaf.kv.key);
                    }
                }
                NodeKind::Internal => {
                    let node = unsafe { tree.internal_at(off) };
                    walk(tree, node.left.load(Ordering::Acquire), out);
                    walk(tree, node.right.load(Ordering::Acquire), out);
                }
            }
        }
        walk(tree, tree.head().root, &mut out);
        out
    }

    #[test]
    fn rejects_reserved_keys() {
        let arena = Arena::new(1024 * 1024).unwrap();
        let tree = BstEfrb::init(&arena).unwrap();
        assert_eq!(tree.insert(SENTINEL1, 0), OpResult::Invalid);
        assert_eq!(tree.insert(SENTINEL2, 0), OpResult::Invalid);
    }

    #[test]
    fn bst_mixed_scenario() {
        let arena = Arena::new(4 * 1024 * 1024).unwrap();
        let tree = BstEfrb::init(&arena).unwrap();

        for k in [50u64, 30, 70, 20, 40, 60, 80] {
            assert_eq!(tree.insert(k, k * 10), OpResult::Success);
        }
        assert_eq!(in_order(&tree), vec![20, 30, 40, 50, 60, 70, 80]);

        assert_eq!(tree.delete(30), OpResult::Success);
        assert_eq!(in_order(&tree), vec![20, 40, 50, 60, 70, 80]);
        assert_eq!(tree.delete(30), OpResult::NotFound);

        assert_eq!(tree.insert(30, 300), OpResult::Success);
        assert_eq!(in_order(&tree), vec![20, 30, 40, 50, 60, 70, 80]);
        assert_eq!(tree.verify(), OpResult::Success);
        assert_eq!(tree.count(), 7);
    }

    #[test]
    fn insert_existing_key_updates_value() {
        let arena = Arena::new(1024 * 1024).unwrap();
        let tree = BstEfrb::init(&arena).unwrap();
        assert_eq!(tree.insert(5, 1), OpResult::Success);
        assert_eq!(tree.insert(5, 2), OpResult::Success);
        assert_eq!(tree.search(5), OpResult::Success);
        assert_eq!(tree.count(), 1);
    }

    #[test]
    fn search_and_verify_after_drain() {
        let arena = Arena::new(4 * 1024 * 1024).unwrap();
        let tree = BstEfrb::init(&arena).unwrap();
        for k in 0..20u64 {
            assert_eq!(tree.insert(k, k), OpResult::Success);
        }
        for k in 0..20u64 {
            assert_eq!(tree.delete(k), OpResult::Success);
        }
        assert_eq!(tree.verify(), OpResult::Success);
        assert_eq!(tree.count(), 0);
        assert_eq!(tree.search(5), OpResult::NotFound);
    }
}
